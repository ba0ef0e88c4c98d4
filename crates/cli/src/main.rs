use clap::Parser;
use config::{Config, FixType, ScanSession, ScanTarget};
use flume::bounded;
use orchestrator::{
    EventSink, MessageLevel, Outcome, ProcessRunner, RunOutcome, ScanEvent, Scanner,
    create_scanner,
};
use scaprun::{
    cli::Cli,
    signals::{SignalEvent, wait_for_signal},
};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // NOTE: The verbosity flag takes precedence over the environment
    // variable for log control. `SCAPRUN_LOG` can only set the log level
    // per crate, not override the verbosity flag.
    let env_filter = EnvFilter::builder()
        .with_env_var("SCAPRUN_LOG")
        .from_env()?
        .add_directive(cli.verbosity.log_level_filter().as_str().parse()?);

    // Progress lines go to stdout; everything else to stderr.
    let layer = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .init();

    // load config
    let config = match &cli.conffile {
        Some(path) => Config::load(path)?,
        _ => {
            let mut candidates = glob::glob("/etc/scaprun/config.d/*.toml")?
                .filter_map(Result::ok)
                .collect::<Vec<_>>();
            candidates.insert(0, "/etc/scaprun/config.toml".into());
            trace!(?candidates, "config file candidates");
            Config::load_multiple(candidates)?
        }
    };
    debug!(?config, ?cli);

    let target = ScanTarget::parse(&cli.target, cli.sudo);
    let session = Arc::new(session_from_cli(&cli));

    let (sink, mut events) = EventSink::channel();
    let mut scanner = create_scanner(&config, &target, session, cli.mode, sink, cli.dry_run);
    let cancel = scanner.cancel_flag();

    // install signal handlers
    let (signals_tx, signals_rx) = bounded(8);
    let mut signal_handle = tokio::spawn(async move { wait_for_signal(signals_tx).await });

    let mut scan_handle = tokio::spawn(async move {
        let outcome = scanner.evaluate().await;
        scanner.shutdown().await;
        (scanner, outcome)
    });

    let mut stdout = std::io::stdout();
    let (scanner, outcome) = loop {
        tokio::select! {
            res = &mut scan_handle => {
                break res?;
            }

            // bubble up any errors from the signal handler
            res = &mut signal_handle => {
                let res = res?;
                if let Err(err) = &res {
                    error!("error happened during handling signals: {}", err);
                }
                res?
            }

            // relay signals as cancellation requests
            event_res = signals_rx.recv_async() => {
                let event = event_res?;
                debug!(?event, "received signal event");
                match event {
                    SignalEvent::CancelRequested => {
                        info!("cancellation requested, waiting for the run to wind down");
                        cancel.request();
                    }
                }
            }

            // relay scan events to the operator
            event = events.recv() => {
                if let Some(event) = event {
                    render(&mut stdout, event);
                }
            }
        }
    };

    // events emitted between the last select round and task completion
    while let Ok(event) = events.try_recv() {
        render(&mut stdout, event);
    }

    match outcome {
        Outcome::Finished => {
            save_artifacts(&cli, &*scanner)?;
            if let (Some(fix), Some(output)) = (cli.fix_type, cli.fix_output.as_ref()) {
                generate_fix(&config, &cli, fix, output, scanner.results()?).await?;
            }
            Ok(())
        }
        Outcome::Canceled => anyhow::bail!("the run did not finish"),
    }
}

/// Turn the collected results into a remediation role via the engine's
/// `generate fix` form.
async fn generate_fix(
    config: &Config,
    cli: &Cli,
    fix: FixType,
    output: &Path,
    results: &[u8],
) -> anyhow::Result<()> {
    let staging = tempfile::NamedTempFile::new()?;
    std::fs::write(staging.path(), results)?;

    let mut runner = ProcessRunner::new(&config.engine.command).args(fix.generate_fix_args(
        cli.profile.as_deref(),
        &output.display().to_string(),
        &staging.path().display().to_string(),
    ));
    match runner.run().await? {
        RunOutcome::Exited(0) => {
            info!(path = %output.display(), "saved remediation role");
            Ok(())
        }
        RunOutcome::Exited(code) => {
            anyhow::bail!("remediation role generation exited with status {code}")
        }
        RunOutcome::Canceled => anyhow::bail!("remediation role generation was canceled"),
    }
}

fn session_from_cli(cli: &Cli) -> ScanSession {
    let mut session = ScanSession::new(&cli.input);
    session.tailoring_path = cli.tailoring.clone();
    session.datastream_id = cli.datastream_id.clone();
    session.component_id = cli.xccdf_id.clone();
    session.profile_id = cli.profile.clone();
    session.skip_validation = cli.skip_valid;
    session.fetch_remote_resources = cli.fetch_remote_resources;
    session
}

fn render(out: &mut impl Write, event: ScanEvent) {
    match event {
        ScanEvent::Progress(progress) => {
            let _ = writeln!(out, "{}  {}", progress.rule, progress.status);
            let _ = out.flush();
        }
        ScanEvent::Message { level, text } => match level {
            MessageLevel::Info => info!("{text}"),
            MessageLevel::Warning => warn!("{text}"),
            MessageLevel::Error => error!("{text}"),
        },
        ScanEvent::Output(chunk) => {
            let _ = write!(out, "{chunk}");
            let _ = out.flush();
        }
        ScanEvent::Canceled => info!("scan canceled"),
        ScanEvent::Finished => info!("scan finished"),
    }
}

fn save_artifacts(cli: &Cli, scanner: &dyn Scanner) -> anyhow::Result<()> {
    let outputs = [
        (cli.results.as_ref(), scanner.results()?, "results"),
        (cli.report.as_ref(), scanner.report()?, "report"),
        (cli.arf.as_ref(), scanner.arf()?, "ARF"),
    ];
    for (path, bytes, label) in outputs {
        if let Some(path) = path {
            std::fs::write(path, bytes)?;
            info!(path = %path.display(), "saved {}", label);
        }
    }
    Ok(())
}
