#![forbid(unsafe_code)]

use super::session::RemoteSession;
use super::shell_quote;
use crate::cancel::CancelFlag;
use crate::error::Error;
use crate::process::{ProcessRunner, RunOutcome};
use std::path::Path;
use tracing::trace;

/// File lifecycle operations on the remote host, each one command run
/// through the session's shared channel.
///
/// Operations inherit the session's cancellation flag, except when built
/// with [`RemoteFileOps::detached`]: cleanup after a canceled run must
/// not cancel itself.
#[derive(Debug)]
pub struct RemoteFileOps<'a> {
    session: &'a RemoteSession,
    detached: bool,
}

impl<'a> RemoteFileOps<'a> {
    pub fn new(session: &'a RemoteSession) -> Self {
        Self {
            session,
            detached: false,
        }
    }

    /// Operations that ignore the session's cancellation flag.
    pub fn detached(session: &'a RemoteSession) -> Self {
        Self {
            session,
            detached: true,
        }
    }

    /// Create a remote temporary file and return its path.
    pub async fn create_temp_file(&self) -> Result<String, Error> {
        let runner = self.run("mktemp", None).await?;
        Ok(trimmed_stdout(&runner))
    }

    /// Create a remote temporary directory and return its path.
    pub async fn create_temp_dir(&self) -> Result<String, Error> {
        let runner = self.run("mktemp -d", None).await?;
        Ok(trimmed_stdout(&runner))
    }

    /// Copy a local file to a fresh remote temporary file, streaming the
    /// bytes as the remote command's standard input.
    pub async fn copy_file_to(&self, local: &Path) -> Result<String, Error> {
        let bytes = tokio::fs::read(local).await?;
        let remote = self.create_temp_file().await?;
        trace!(local = %local.display(), remote = %remote, "copying file to remote");
        self.run(&format!("cat > {}", shell_quote(&remote)), Some(bytes))
            .await?;
        Ok(remote)
    }

    /// Read a remote file's contents back.
    pub async fn read_file(&self, remote: &str) -> Result<Vec<u8>, Error> {
        let runner = self.run(&format!("cat {}", shell_quote(remote)), None).await?;
        Ok(runner.stdout().unwrap_or_default().to_vec())
    }

    /// Remove a remote file. Callers treat failures as warnings.
    pub async fn remove_file(&self, remote: &str) -> Result<(), Error> {
        self.run(&format!("rm -f {}", shell_quote(remote)), None)
            .await?;
        Ok(())
    }

    /// Remove a remote directory tree. Callers treat failures as warnings.
    pub async fn remove_dir(&self, remote: &str) -> Result<(), Error> {
        self.run(&format!("rm -rf {}", shell_quote(remote)), None)
            .await?;
        Ok(())
    }

    async fn run(&self, remote_command: &str, stdin: Option<Vec<u8>>) -> Result<ProcessRunner, Error> {
        let mut runner = self.session.command(remote_command)?;
        if self.detached {
            runner = runner.cancel_flag(CancelFlag::new());
        }
        if let Some(bytes) = stdin {
            runner = runner.stdin_bytes(bytes);
        }
        match runner.run().await? {
            RunOutcome::Exited(0) => Ok(runner),
            RunOutcome::Exited(status) => Err(Error::RemoteOp {
                status,
                detail: runner.transcript().unwrap_or_default().to_string(),
            }),
            RunOutcome::Canceled => Err(Error::RemoteOp {
                status: -1,
                detail: format!("`{remote_command}` canceled"),
            }),
        }
    }
}

fn trimmed_stdout(runner: &ProcessRunner) -> String {
    String::from_utf8_lossy(runner.stdout().unwrap_or_default())
        .trim()
        .to_string()
}
