#![forbid(unsafe_code)]

use super::args::{ArtifactPaths, build_args, check_prerequisites, probe_args};
use super::{Abort, Outcome, ScanArtifacts, ScanContext, Scanner};
use crate::cancel::CancelFlag;
use crate::capability::Capabilities;
use crate::error::Error;
use crate::events::EventSink;
use async_trait::async_trait;
use config::{ScanMode, ScanSession};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Runs the engine on this machine.
///
/// Result artifacts are written into a private temporary directory that
/// lives for the duration of the run; removing it afterwards is the
/// single cleanup step.
pub struct LocalScanner {
    ctx: ScanContext,
}

impl LocalScanner {
    pub fn new(
        config: &config::Config,
        session: Arc<ScanSession>,
        mode: ScanMode,
        sink: EventSink,
    ) -> Self {
        Self {
            ctx: ScanContext::new(config, session, mode, sink),
        }
    }

    /// Preview the command line instead of running anything.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.ctx.dry_run = enabled;
        self
    }

    fn preview(&self) -> ScanArtifacts {
        let paths = ArtifactPaths {
            input: self.ctx.session.input_path.display().to_string(),
            tailoring: self
                .ctx
                .session
                .tailoring_path
                .as_ref()
                .map(|path| path.display().to_string()),
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

        // Probing capabilities.
        let runner = self
            .ctx
            .runner(&self.ctx.engine.command)
            .args(probe_args());
        self.ctx.probe_with(runner).await?;

        // Checking prerequisites.
        if let Err(err) = check_prerequisites(self.ctx.mode, &self.ctx.session, &self.ctx.capabilities)
        {
            return Err(self.ctx.fail(err.to_string()));
        }

        // Staging: a private directory for the result artifacts.
        let work_dir = tempfile::Builder::new()
            .prefix("scaprun-work.")
            .tempdir()
            .map_err(|err| {
                self.ctx
                    .fail(format!("Failed to create working directory: {err}"))
            })?;
        let paths = ArtifactPaths {
            input: self.ctx.session.input_path.display().to_string(),
            tailoring: self
                .ctx
                .session
                .tailoring_path
                .as_ref()
                .map(|path| path.display().to_string()),
            results: work_dir.path().join("results.xml").display().to_string(),
            report: work_dir.path().join("report.html").display().to_string(),
            arf: work_dir.path().join("arf.xml").display().to_string(),
        };

        // Running.
        let args = build_args(self.ctx.mode, &self.ctx.session, &self.ctx.capabilities, &paths);
        let mut runner = match &self.ctx.engine.elevation_command {
            Some(wrapper) => {
                info!(wrapper = %wrapper.display(), "running engine through elevation wrapper");
                self.ctx
                    .runner(wrapper)
                    .args([self.ctx.engine.command.display().to_string()])
                    .args(args)
            }
            None => self.ctx.runner(&self.ctx.engine.command).args(args),
        };
        runner = runner.working_dir(work_dir.path());
        self.ctx.pump_engine(&mut runner).await?;

        // Completing: collect whatever the engine produced.
        let artifacts = ScanArtifacts {
            results: self.collect(Path::new(&paths.results), "results").await,
            report: self.collect(Path::new(&paths.report), "report").await,
            arf: self.collect(Path::new(&paths.arf), "ARF").await,
        };
        Ok(artifacts)
        // work_dir drops here, removing the temporaries.
    }

    async fn collect(&self, path: &Path, label: &str) -> Vec<u8> {
        match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.ctx
                    .sink
                    .warning(format!("Failed to collect the {label} artifact: {err}"));
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Scanner for LocalScanner {
    async fn evaluate(&mut self) -> Outcome {
        self.ctx.artifacts = None;
        let result = self.drive().await;
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
}
