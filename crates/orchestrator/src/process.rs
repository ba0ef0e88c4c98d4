#![forbid(unsafe_code)]

use crate::cancel::CancelFlag;
use crate::error::Error;
use crate::events::EventSink;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_millis(3000);

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The child exited on its own with this code (`-1` when terminated
    /// by a signal it did not survive).
    Exited(i32),
    /// A cancellation request was observed and the child was asked to
    /// terminate (and force-killed if it overstayed the grace window).
    Canceled,
}

/// Captured output of one completed run.
#[derive(Debug, Clone)]
pub struct RunResult {
    exit_code: i32,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    transcript: String,
}

/// Runs one external command while staying responsive to cancellation.
///
/// The runner pumps the child's stdout and stderr as they arrive and
/// observes its cancellation flag on a fixed poll interval. On the first
/// tick where the flag is set it sends SIGTERM; if the child has not
/// exited by the end of the grace window it is force-killed. After the
/// child exits all remaining output is drained and a diagnostic
/// transcript (command line plus labeled stream blocks) is recorded.
///
/// One run at a time; configuration is fixed at construction.
#[derive(Debug)]
pub struct ProcessRunner {
    command: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
    stdin_bytes: Option<Vec<u8>>,
    poll_interval: Duration,
    termination_grace: Duration,
    cancel: CancelFlag,
    running: bool,
    result: Option<RunResult>,
}

impl ProcessRunner {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            envs: Vec::new(),
            stdin_bytes: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            termination_grace: DEFAULT_TERMINATION_GRACE,
            cancel: CancelFlag::new(),
            running: false,
            result: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Bytes written to the child's stdin. Consumed by the next run.
    pub fn stdin_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.stdin_bytes = Some(bytes);
        self
    }

    /// Install an externally shared cancellation flag.
    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }

    /// Request cancellation of the current (or next) run.
    pub fn cancel(&self) {
        self.cancel.request();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The literal command line, for transcripts and previews.
    pub fn command_line(&self) -> String {
        let mut line = self.command.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    pub fn exit_code(&self) -> Result<i32, Error> {
        Ok(self.finished()?.exit_code)
    }

    pub fn stdout(&self) -> Result<&[u8], Error> {
        Ok(&self.finished()?.stdout)
    }

    pub fn stderr(&self) -> Result<&[u8], Error> {
        Ok(&self.finished()?.stderr)
    }

    pub fn transcript(&self) -> Result<&str, Error> {
        Ok(&self.finished()?.transcript)
    }

    fn finished(&self) -> Result<&RunResult, Error> {
        if self.running {
            return Err(Error::InvalidState("run still in progress"));
        }
        self.result
            .as_ref()
            .ok_or(Error::InvalidState("no completed run"))
    }

    /// Run to completion, capturing stdout and stderr separately.
    pub async fn run(&mut self) -> Result<RunOutcome, Error> {
        self.run_with(|_| {}, |_| {}).await
    }

    /// Run to completion, relaying each chunk to the callbacks as it
    /// arrives in addition to capturing it.
    pub async fn run_with(
        &mut self,
        on_stdout: impl FnMut(&[u8]),
        on_stderr: impl FnMut(&[u8]),
    ) -> Result<RunOutcome, Error> {
        self.run_inner(on_stdout, on_stderr, true).await
    }

    /// Run to completion, streaming combined output to the event sink.
    ///
    /// This variant is lossy: stdout and stderr are interleaved in
    /// arrival order and are not separately retrievable afterwards. The
    /// exit code and transcript remain available.
    pub async fn run_streaming(&mut self, sink: &EventSink) -> Result<RunOutcome, Error> {
        let out_sink = sink.clone();
        let err_sink = sink.clone();
        self.run_inner(
            move |chunk: &[u8]| out_sink.output(String::from_utf8_lossy(chunk)),
            move |chunk: &[u8]| err_sink.output(String::from_utf8_lossy(chunk)),
            false,
        )
        .await
    }

    async fn run_inner(
        &mut self,
        on_stdout: impl FnMut(&[u8]),
        on_stderr: impl FnMut(&[u8]),
        separate: bool,
    ) -> Result<RunOutcome, Error> {
        if self.running {
            return Err(Error::InvalidState("a run is already in progress"));
        }
        self.running = true;
        self.result = None;
        let outcome = self.pump(on_stdout, on_stderr, separate).await;
        self.running = false;
        outcome
    }

    async fn pump(
        &mut self,
        mut on_stdout: impl FnMut(&[u8]),
        mut on_stderr: impl FnMut(&[u8]),
        separate: bool,
    ) -> Result<RunOutcome, Error> {
        let command_line = self.command_line();
        debug!(command = %command_line, "spawning");

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(if self.stdin_bytes.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| Error::ProcessLaunch {
            command: self.command.display().to_string(),
            source,
        })?;

        if let Some(bytes) = self.stdin_bytes.take()
            && let Some(mut stdin) = child.stdin.take()
        {
            // Written from a separate task so a large payload cannot
            // deadlock against an unfed output pipe.
            tokio::spawn(async move {
                if let Err(err) = stdin.write_all(&bytes).await {
                    warn!(%err, "failed to write child stdin");
                }
            });
        }

        let Some(mut stdout) = child.stdout.take() else {
            return Err(Error::Io(std::io::Error::other("child stdout not captured")));
        };
        let Some(mut stderr) = child.stderr.take() else {
            return Err(Error::Io(std::io::Error::other("child stderr not captured")));
        };

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let mut combined_buf = Vec::new();
        let mut out_chunk = vec![0u8; 8192];
        let mut err_chunk = vec![0u8; 8192];
        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut exit_status = None;

        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut termination_requested = false;
        let mut killed = false;
        let mut kill_deadline = None;
        let mut drain_deadline: Option<Instant> = None;

        while exit_status.is_none() || !stdout_done || !stderr_done {
            tokio::select! {
                read = stdout.read(&mut out_chunk), if !stdout_done => match read {
                    Ok(0) => stdout_done = true,
                    Ok(n) => {
                        on_stdout(&out_chunk[..n]);
                        if separate {
                            stdout_buf.extend_from_slice(&out_chunk[..n]);
                        } else {
                            combined_buf.extend_from_slice(&out_chunk[..n]);
                        }
                    }
                    Err(err) => {
                        warn!(%err, "stdout read failed");
                        stdout_done = true;
                    }
                },
                read = stderr.read(&mut err_chunk), if !stderr_done => match read {
                    Ok(0) => stderr_done = true,
                    Ok(n) => {
                        on_stderr(&err_chunk[..n]);
                        if separate {
                            stderr_buf.extend_from_slice(&err_chunk[..n]);
                        } else {
                            combined_buf.extend_from_slice(&err_chunk[..n]);
                        }
                    }
                    Err(err) => {
                        warn!(%err, "stderr read failed");
                        stderr_done = true;
                    }
                },
                status = child.wait(), if exit_status.is_none() => {
                    exit_status = Some(status?);
                    // A forked grandchild (an ssh master, say) can hold the
                    // pipes open past the child's exit; bound the drain.
                    drain_deadline = Some(Instant::now() + self.poll_interval.max(Duration::from_millis(100)) * 3);
                },
                _ = interval.tick() => {
                    if exit_status.is_some() {
                        if drain_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                            stdout_done = true;
                            stderr_done = true;
                        }
                        continue;
                    }
                    if !self.cancel.is_requested() {
                        continue;
                    }
                    if !termination_requested {
                        termination_requested = true;
                        kill_deadline = Some(Instant::now() + self.termination_grace);
                        if let Some(pid) = child.id() {
                            trace!(pid, "requesting graceful termination");
                            if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                                warn!(%err, pid, "failed to send SIGTERM");
                            }
                        }
                    } else if !killed
                        && kill_deadline.is_some_and(|deadline| Instant::now() >= deadline)
                    {
                        killed = true;
                        trace!("grace window elapsed, killing child");
                        if let Err(err) = child.start_kill() {
                            warn!(%err, "failed to kill child");
                        }
                    }
                },
            }
        }

        let status = exit_status.ok_or(Error::InvalidState("child exited without status"))?;
        let exit_code = status.code().unwrap_or(-1);
        debug!(exit_code, canceled = termination_requested, "child exited");

        let mut transcript = format!("$ {command_line}\n");
        if separate {
            transcript.push_str("stdout:\n");
            transcript.push_str(&String::from_utf8_lossy(&stdout_buf));
            transcript.push_str("\nstderr:\n");
            transcript.push_str(&String::from_utf8_lossy(&stderr_buf));
            transcript.push('\n');
        } else {
            transcript.push_str("output:\n");
            transcript.push_str(&String::from_utf8_lossy(&combined_buf));
            transcript.push('\n');
        }

        self.result = Some(RunResult {
            exit_code,
            stdout: stdout_buf,
            stderr: stderr_buf,
            transcript,
        });

        if termination_requested {
            Ok(RunOutcome::Canceled)
        } else {
            Ok(RunOutcome::Exited(exit_code))
        }
    }
}
