#![forbid(unsafe_code)]

use super::args::{ArtifactPaths, build_args, check_prerequisites, probe_args};
use super::{Abort, Outcome, ScanArtifacts, ScanContext, Scanner};
use crate::cancel::CancelFlag;
use crate::capability::Capabilities;
use crate::error::Error;
use crate::events::EventSink;
use crate::remote::{RemoteFileOps, RemoteSession, shell_join, shell_quote};
use async_trait::async_trait;
use config::{ScanMode, ScanSession};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct StagedPath {
    path: String,
    dir: bool,
}

/// Runs the engine on a remote host over the shared SSH channel.
///
/// Input files are copied over before the run; results are read back and
/// every staged temporary gets exactly one removal attempt afterwards,
/// on both the finished and the canceled path. The channel itself stays
/// up for the scanner's lifetime so consecutive runs reuse the
/// authenticated connection.
pub struct RemoteScanner {
    ctx: ScanContext,
    link: RemoteSession,
    sudo: bool,
    staged: Vec<StagedPath>,
}

impl RemoteScanner {
    pub fn new(
        config: &config::Config,
        host: impl Into<String>,
        port: u16,
        sudo: bool,
        session: Arc<ScanSession>,
        mode: ScanMode,
        sink: EventSink,
    ) -> Self {
        let ctx = ScanContext::new(config, session, mode, sink);
        let mut link = RemoteSession::new(&config.engine, host, port);
        // The link shares the scanner's cancellation flag; a fresh
        // session cannot be connected, so this cannot fail.
        if let Err(err) = link.set_cancel_flag(ctx.cancel.clone()) {
            warn!(%err, "failed to install cancellation flag on the ssh session");
        }
        Self {
            ctx,
            link,
            sudo,
            staged: Vec::new(),
        }
    }

    /// Preview the command line instead of running anything.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.ctx.dry_run = enabled;
        self
    }

    fn preview(&self) -> ScanArtifacts {
        let paths = ArtifactPaths {
            input: "input.xml".to_string(),
            tailoring: self
                .ctx
                .session
                .tailoring_path
                .as_ref()
                .map(|_| "tailoring.xml".to_string()),
            results: "results.xml".to_string(),
            report: "report.html".to_string(),
            arf: "arf.xml".to_string(),
        };
        let args = build_args(
            self.ctx.mode,
            &self.ctx.session,
            &Capabilities::assumed(),
            &paths,
        );
        self.ctx.sink.info(format!(
            "{} {}",
            self.ctx.engine.command.display(),
            args.join(" ")
        ));
        ScanArtifacts::default()
    }

    async fn drive(&mut self) -> Result<ScanArtifacts, Abort> {
        if self.ctx.dry_run {
            return Ok(self.preview());
        }

        // Establish (or reuse) the shared channel.
        if !self.link.is_connected() {
            self.ctx.sink.info(format!(
                "Establishing a connection to {}:{}...",
                self.link.host(),
                self.link.port()
            ));
            if let Err(err) = self.link.connect().await {
                return Err(self.ctx.fail(format!("Failed to connect: {err}")));
            }
        }

        // Probing capabilities.
        let probe_cmd = shell_join(
            std::iter::once(self.ctx.engine.command.display().to_string())
                .chain(probe_args()),
        );
        let runner = match self.link.command(&probe_cmd) {
            Ok(runner) => runner,
            Err(err) => return Err(self.ctx.fail(format!("Failed to build probe command: {err}"))),
        };
        self.ctx.probe_with(runner).await?;

        // Checking prerequisites.
        if let Err(err) = check_prerequisites(self.ctx.mode, &self.ctx.session, &self.ctx.capabilities)
        {
            return Err(self.ctx.fail(err.to_string()));
        }

        // Staging input and result paths on the remote host.
        let fs = RemoteFileOps::new(&self.link);

        let input = match fs.copy_file_to(&self.ctx.session.input_path).await {
            Ok(path) => {
                self.staged.push(StagedPath { path: path.clone(), dir: false });
                path
            }
            Err(err) => return Err(self.ctx.fail(format!("Failed to copy the input file: {err}"))),
        };

        let tailoring = match &self.ctx.session.tailoring_path {
            Some(local) => match fs.copy_file_to(local).await {
                Ok(path) => {
                    self.staged.push(StagedPath { path: path.clone(), dir: false });
                    Some(path)
                }
                Err(err) => {
                    return Err(self
                        .ctx
                        .fail(format!("Failed to copy the tailoring file: {err}")));
                }
            },
            None => None,
        };

        let mut artifact_paths = Vec::with_capacity(3);
        for label in ["results", "report", "ARF"] {
            match fs.create_temp_file().await {
                Ok(path) => {
                    self.staged.push(StagedPath { path: path.clone(), dir: false });
                    artifact_paths.push(path);
                }
                Err(err) => {
                    return Err(self
                        .ctx
                        .fail(format!("Failed to allocate a remote {label} file: {err}")));
                }
            }
        }
        let [results, report, arf]: [String; 3] = match artifact_paths.try_into() {
            Ok(paths) => paths,
            Err(_) => return Err(self.ctx.fail("Failed to allocate remote artifact paths")),
        };

        let work_dir = match fs.create_temp_dir().await {
            Ok(path) => {
                self.staged.push(StagedPath { path: path.clone(), dir: true });
                path
            }
            Err(err) => {
                return Err(self
                    .ctx
                    .fail(format!("Failed to create a remote working directory: {err}")));
            }
        };

        // Running.
        let paths = ArtifactPaths {
            input,
            tailoring,
            results,
            report,
            arf,
        };
        let args = build_args(self.ctx.mode, &self.ctx.session, &self.ctx.capabilities, &paths);
        let mut words = Vec::with_capacity(args.len() + 2);
        if self.sudo {
            words.push("sudo".to_string());
        }
        words.push(self.ctx.engine.command.display().to_string());
        words.extend(args);
        let remote_command = format!(
            "cd {} && {}",
            shell_quote(&work_dir),
            shell_join(&words)
        );
        debug!(command = %remote_command, "running remote engine");

        let mut runner = match self.link.command(&remote_command) {
            Ok(runner) => runner,
            Err(err) => {
                return Err(self
                    .ctx
                    .fail(format!("Failed to build the engine command: {err}")));
            }
        };
        self.ctx.pump_engine(&mut runner).await?;

        // Completing: read the artifacts back. A failed fetch costs that
        // artifact, not the run.
        let mut artifacts = ScanArtifacts::default();
        for (remote, slot, label) in [
            (&paths.results, &mut artifacts.results, "results"),
            (&paths.report, &mut artifacts.report, "report"),
            (&paths.arf, &mut artifacts.arf, "ARF"),
        ] {
            match fs.read_file(remote).await {
                Ok(bytes) => *slot = bytes,
                Err(err) => {
                    self.ctx
                        .sink
                        .warning(format!("Failed to fetch the {label} artifact: {err}"));
                }
            }
        }
        Ok(artifacts)
    }

    /// Issue exactly one removal attempt for every staged temporary.
    ///
    /// Failures are warnings; they never change the run's outcome.
    async fn cleanup(&mut self) {
        let staged = std::mem::take(&mut self.staged);
        if staged.is_empty() || !self.link.is_connected() {
            return;
        }
        let fs = RemoteFileOps::detached(&self.link);
        for item in staged {
            let removed = if item.dir {
                fs.remove_dir(&item.path).await
            } else {
                fs.remove_file(&item.path).await
            };
            if let Err(err) = removed {
                self.ctx.sink.warning(format!(
                    "Failed to remove the remote temporary {}: {err}",
                    item.path
                ));
            }
        }
    }
}

#[async_trait]
impl Scanner for RemoteScanner {
    async fn evaluate(&mut self) -> Outcome {
        self.ctx.artifacts = None;
        let result = self.drive().await;
        // Cleanup always follows artifact collection, on both paths.
        self.cleanup().await;
        self.ctx.finish(result)
    }

    fn cancel(&self) {
        self.ctx.cancel.request();
    }

    fn cancel_flag(&self) -> CancelFlag {
        self.ctx.cancel.clone()
    }

    fn capabilities(&self) -> &Capabilities {
        &self.ctx.capabilities
    }

    fn results(&self) -> Result<&[u8], Error> {
        self.ctx.results()
    }

    fn report(&self) -> Result<&[u8], Error> {
        self.ctx.report()
    }

    fn arf(&self) -> Result<&[u8], Error> {
        self.ctx.arf()
    }

    async fn shutdown(&mut self) {
        if self.link.is_connected()
            && let Err(err) = self.link.disconnect().await
        {
            warn!(%err, "failed to disconnect the ssh session");
        }
    }
}
