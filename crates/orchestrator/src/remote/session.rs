#![forbid(unsafe_code)]

use crate::cancel::CancelFlag;
use crate::error::Error;
use crate::process::{ProcessRunner, RunOutcome};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// One shared, authenticated SSH channel to a target host.
///
/// `connect()` launches a control-master process that authenticates once
/// and then idles behind a control socket in a private local temporary
/// directory; every command built with [`RemoteSession::command`]
/// references that socket, so the OS multiplexes it onto the existing
/// channel instead of re-authenticating. Connection parameters are
/// frozen while a channel is live; reconnecting requires an explicit
/// `disconnect()` first. Dropping a connected session tears the channel
/// down best-effort.
#[derive(Debug)]
pub struct RemoteSession {
    ssh_command: PathBuf,
    host: String,
    port: u16,
    keepalive_interval: Duration,
    poll_interval: Duration,
    termination_grace: Duration,
    cancel: CancelFlag,
    envs: Vec<(String, String)>,
    connection: Option<Connection>,
}

#[derive(Debug)]
struct Connection {
    /// Owns the directory holding the control socket; removing it on
    /// teardown also removes the socket.
    control_dir: TempDir,
    socket: PathBuf,
}

impl RemoteSession {
    pub fn new(engine: &config::Engine, host: impl Into<String>, port: u16) -> Self {
        Self {
            ssh_command: engine.ssh_command.clone(),
            host: host.into(),
            port,
            keepalive_interval: engine.keepalive_interval,
            poll_interval: engine.poll_interval,
            termination_grace: engine.termination_grace,
            cancel: CancelFlag::new(),
            envs: Vec::new(),
            connection: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn control_socket(&self) -> Option<&Path> {
        self.connection.as_ref().map(|conn| conn.socket.as_path())
    }

    pub fn set_host(&mut self, host: impl Into<String>) -> Result<(), Error> {
        self.frozen_check()?;
        self.host = host.into();
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), Error> {
        self.frozen_check()?;
        self.port = port;
        Ok(())
    }

    pub fn set_cancel_flag(&mut self, cancel: CancelFlag) -> Result<(), Error> {
        self.frozen_check()?;
        self.cancel = cancel;
        Ok(())
    }

    /// Environment overlay applied to every spawned ssh process.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), Error> {
        self.frozen_check()?;
        self.envs.push((key.into(), value.into()));
        Ok(())
    }

    fn frozen_check(&self) -> Result<(), Error> {
        if self.connection.is_some() {
            return Err(Error::Connection(
                "connection parameters are frozen while connected".to_string(),
            ));
        }
        Ok(())
    }

    /// Establish the shared channel.
    ///
    /// Blocks until the forked master reports readiness (exit 0 after
    /// authenticating) or fails.
    pub async fn connect(&mut self) -> Result<(), Error> {
        if self.connection.is_some() {
            return Err(Error::Connection("already connected".to_string()));
        }

        let control_dir = tempfile::Builder::new()
            .prefix("scaprun-ctl.")
            .tempdir()
            .map_err(|err| {
                Error::Connection(format!("failed to create control directory: {err}"))
            })?;
        let socket = control_dir.path().join("control.sock");

        let mut runner = self
            .runner()
            .args([
                "-M".to_string(),
                "-f".to_string(),
                "-N".to_string(),
                "-o".to_string(),
                format!("ControlPath={}", socket.display()),
                "-o".to_string(),
                format!("ServerAliveInterval={}", self.keepalive_interval.as_secs()),
                "-p".to_string(),
                self.port.to_string(),
                self.host.clone(),
            ]);

        match runner.run().await? {
            RunOutcome::Exited(0) => {
                info!(host = %self.host, port = self.port, "ssh master established");
                self.connection = Some(Connection {
                    control_dir,
                    socket,
                });
                Ok(())
            }
            RunOutcome::Exited(code) => Err(Error::Connection(format!(
                "ssh master exited with status {code}\n{}",
                runner.transcript().unwrap_or_default()
            ))),
            RunOutcome::Canceled => {
                Err(Error::Connection("connection attempt canceled".to_string()))
            }
        }
    }

    /// Tear the shared channel down and remove the control directory.
    pub async fn disconnect(&mut self) -> Result<(), Error> {
        let Some(connection) = self.connection.take() else {
            return Err(Error::Connection("not connected".to_string()));
        };

        let mut runner = self.runner().args([
            "-S".to_string(),
            connection.socket.display().to_string(),
            "-O".to_string(),
            "exit".to_string(),
            self.host.clone(),
        ]);
        match runner.run().await {
            Ok(RunOutcome::Exited(0)) => debug!(host = %self.host, "ssh master closed"),
            Ok(_) | Err(_) => {
                warn!(host = %self.host, "failed to close ssh master cleanly");
            }
        }

        if let Err(err) = connection.control_dir.close() {
            warn!(%err, "failed to remove control directory");
        }
        Ok(())
    }

    /// Build a runner for one command executed through the shared channel.
    ///
    /// `remote_command` is passed to the remote user's shell verbatim, so
    /// it must already be quoted (see [`super::shell_join`]).
    pub fn command(&self, remote_command: &str) -> Result<ProcessRunner, Error> {
        let Some(connection) = &self.connection else {
            return Err(Error::Connection("not connected".to_string()));
        };
        Ok(self.runner().args([
            "-o".to_string(),
            format!("ControlPath={}", connection.socket.display()),
            "-p".to_string(),
            self.port.to_string(),
            self.host.clone(),
            remote_command.to_string(),
        ]))
    }

    fn runner(&self) -> ProcessRunner {
        let mut runner = ProcessRunner::new(&self.ssh_command)
            .cancel_flag(self.cancel.clone())
            .poll_interval(self.poll_interval)
            .termination_grace(self.termination_grace);
        for (key, value) in &self.envs {
            runner = runner.env(key, value);
        }
        runner
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        // No async context in drop; close the master synchronously and
        // swallow failures.
        let result = std::process::Command::new(&self.ssh_command)
            .args([
                "-S",
                &connection.socket.display().to_string(),
                "-O",
                "exit",
                &self.host,
            ])
            .output();
        match result {
            Ok(output) if output.status.success() => {}
            Ok(_) | Err(_) => warn!(host = %self.host, "ssh master teardown failed during drop"),
        }
        // control_dir drops here, removing the socket directory.
    }
}
