#![forbid(unsafe_code)]

mod args;
mod local;
mod remote;

pub use args::{ArtifactPaths, build_args, check_prerequisites, probe_args};
pub use local::LocalScanner;
pub use remote::RemoteScanner;

use crate::cancel::CancelFlag;
use crate::capability::Capabilities;
use crate::error::Error;
use crate::events::{EventSink, ScanEvent};
use crate::process::{ProcessRunner, RunOutcome};
use crate::progress::{ProgressNote, ProgressParser};
use async_trait::async_trait;
use config::{ScanMode, ScanSession, ScanTarget};
use std::sync::Arc;
use tracing::debug;

/// Terminal state of one `evaluate()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Finished,
    Canceled,
}

/// Result artifacts of a successful, non-canceled run.
#[derive(Debug, Clone, Default)]
pub struct ScanArtifacts {
    pub results: Vec<u8>,
    pub report: Vec<u8>,
    pub arf: Vec<u8>,
}

/// One full scan or remediation run against a target.
///
/// Implementations relay progress and messages through their event sink
/// while `evaluate()` runs and emit exactly one terminal event per call.
/// Artifact getters succeed only after a `Finished` outcome.
#[async_trait]
pub trait Scanner: Send {
    /// Drive one run to its terminal state.
    async fn evaluate(&mut self) -> Outcome;

    /// Request cancellation. Advisory: the run observes the request at
    /// its next poll tick, never synchronously.
    fn cancel(&self);

    /// Shared cancellation handle for wiring into signal handlers.
    fn cancel_flag(&self) -> CancelFlag;

    /// Capability snapshot from the most recent probe.
    fn capabilities(&self) -> &Capabilities;

    fn results(&self) -> Result<&[u8], Error>;
    fn report(&self) -> Result<&[u8], Error>;
    fn arf(&self) -> Result<&[u8], Error>;

    /// Release long-lived resources (remote channels). A no-op for
    /// scanners that hold none.
    async fn shutdown(&mut self) {}
}

/// Build the scanner variant matching the target.
pub fn create_scanner(
    config: &config::Config,
    target: &ScanTarget,
    session: Arc<ScanSession>,
    mode: ScanMode,
    sink: EventSink,
    dry_run: bool,
) -> Box<dyn Scanner + Send> {
    match target {
        ScanTarget::Local => {
            Box::new(LocalScanner::new(config, session, mode, sink).dry_run(dry_run))
        }
        ScanTarget::Remote { host, port, sudo } => Box::new(
            RemoteScanner::new(config, host, *port, *sudo, session, mode, sink).dry_run(dry_run),
        ),
    }
}

/// Marker for a run that already reported its failure and must end in
/// the canceled-equivalent terminal state.
pub(crate) struct Abort;

/// State shared by both scanner variants through composition.
pub(crate) struct ScanContext {
    pub engine: config::Engine,
    pub session: Arc<ScanSession>,
    pub mode: ScanMode,
    pub sink: EventSink,
    pub cancel: CancelFlag,
    pub capabilities: Capabilities,
    pub artifacts: Option<ScanArtifacts>,
    pub dry_run: bool,
}

impl ScanContext {
    pub fn new(
        config: &config::Config,
        session: Arc<ScanSession>,
        mode: ScanMode,
        sink: EventSink,
    ) -> Self {
        Self {
            engine: config.engine.clone(),
            session,
            mode,
            sink,
            cancel: CancelFlag::new(),
            capabilities: Capabilities::default(),
            artifacts: None,
            dry_run: false,
        }
    }

    /// Report a failure as an error event, unless the run is being
    /// canceled anyway, and return the abort marker.
    pub fn fail(&self, text: impl Into<String>) -> Abort {
        if !self.cancel.is_requested() {
            self.sink.error(text.into());
        }
        Abort
    }

    /// Base runner carrying this run's cancellation flag and timings.
    pub fn runner(&self, command: impl Into<std::path::PathBuf>) -> ProcessRunner {
        ProcessRunner::new(command)
            .cancel_flag(self.cancel.clone())
            .poll_interval(self.engine.poll_interval)
            .termination_grace(self.engine.termination_grace)
    }

    /// Run the capability probe and replace the capability snapshot.
    pub async fn probe_with(&mut self, mut runner: ProcessRunner) -> Result<(), Abort> {
        match runner.run().await {
            Ok(RunOutcome::Exited(0)) => {
                let banner = String::from_utf8_lossy(runner.stdout().unwrap_or_default()).to_string();
                self.capabilities = Capabilities::parse(&banner);
                debug!(version = ?self.capabilities.engine_version(), "capability probe succeeded");
                Ok(())
            }
            Ok(RunOutcome::Exited(code)) => Err(self.fail(format!(
                "Capability probe exited with status {code}\n{}",
                runner.transcript().unwrap_or_default()
            ))),
            Ok(RunOutcome::Canceled) => Err(Abort),
            Err(err) => Err(self.fail(format!("Failed to probe engine capabilities: {err}"))),
        }
    }

    /// Run the engine, relaying progress and stderr as events.
    pub async fn pump_engine(&mut self, runner: &mut ProcessRunner) -> Result<(), Abort> {
        let mut parser = if self.capabilities.progress_reporting() {
            ProgressParser::new()
        } else {
            ProgressParser::disabled()
        };
        let sink = self.sink.clone();
        let mut stderr_pending = String::new();

        let result = runner
            .run_with(
                |chunk| {
                    for note in parser.feed(&String::from_utf8_lossy(chunk)) {
                        match note {
                            ProgressNote::Event(event) => sink.progress(event),
                            ProgressNote::Malformed(raw) => {
                                sink.warning(format!("Malformed progress output: {raw:?}"));
                            }
                        }
                    }
                },
                |chunk| {
                    stderr_pending.push_str(&String::from_utf8_lossy(chunk));
                    while let Some(pos) = stderr_pending.find('\n') {
                        let line: String = stderr_pending.drain(..=pos).collect();
                        let line = line.trim_end();
                        if !line.is_empty() {
                            sink.warning(line);
                        }
                    }
                },
            )
            .await;

        let trailing = stderr_pending.trim();
        if !trailing.is_empty() {
            self.sink.warning(trailing);
        }

        match result {
            Ok(RunOutcome::Exited(0)) => Ok(()),
            Ok(RunOutcome::Exited(code)) => Err(self.fail(format!(
                "Engine exited with status {code}\n{}",
                runner.transcript().unwrap_or_default()
            ))),
            Ok(RunOutcome::Canceled) => Err(Abort),
            Err(err) => Err(self.fail(format!("Failed to run the engine: {err}"))),
        }
    }

    /// Enter the terminal state: clear the cancellation flag, store
    /// artifacts, and emit exactly one terminal event.
    pub fn finish(&mut self, result: Result<ScanArtifacts, Abort>) -> Outcome {
        self.cancel.clear();
        match result {
            Ok(artifacts) => {
                self.artifacts = Some(artifacts);
                self.sink.send(ScanEvent::Finished);
                Outcome::Finished
            }
            Err(Abort) => {
                self.artifacts = None;
                self.sink.send(ScanEvent::Canceled);
                Outcome::Canceled
            }
        }
    }

    pub fn results(&self) -> Result<&[u8], Error> {
        Ok(&self.collected()?.results)
    }

    pub fn report(&self) -> Result<&[u8], Error> {
        Ok(&self.collected()?.report)
    }

    pub fn arf(&self) -> Result<&[u8], Error> {
        Ok(&self.collected()?.arf)
    }

    fn collected(&self) -> Result<&ScanArtifacts, Error> {
        self.artifacts
            .as_ref()
            .ok_or(Error::InvalidState("no artifacts: the run did not finish"))
    }
}
