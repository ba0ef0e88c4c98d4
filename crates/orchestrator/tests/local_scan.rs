#![forbid(unsafe_code)]

use config::{Config, ScanMode, ScanSession};
use orchestrator::{
    EventSink, LocalScanner, MessageLevel, Outcome, RuleStatus, ScanEvent, Scanner,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const WORKING_ENGINE: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
    printf 'OpenSCAP command line tool (oscap) 1.2.17\n'
    exit 0
fi
results=""; report=""; arf=""
while [ $# -gt 0 ]; do
    case "$1" in
        --results) results="$2"; shift 2 ;;
        --report) report="$2"; shift 2 ;;
        --results-arf) arf="$2"; shift 2 ;;
        *) shift ;;
    esac
done
printf 'rule1:pass\n'
echo '<TestResult/>' > "$results"
echo '<html/>' > "$report"
echo '<arf/>' > "$arf"
exit 0
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn test_config(engine: PathBuf) -> Config {
    let mut config = Config::default();
    config.engine.command = engine;
    config.engine.poll_interval = Duration::from_millis(20);
    config.engine.termination_grace = Duration::from_millis(400);
    config
}

fn drain(events: &mut UnboundedReceiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut all = Vec::new();
    while let Ok(event) = events.try_recv() {
        all.push(event);
    }
    all
}

fn terminal_events(events: &[ScanEvent]) -> (usize, usize) {
    let finished = events
        .iter()
        .filter(|event| matches!(event, ScanEvent::Finished))
        .count();
    let canceled = events
        .iter()
        .filter(|event| matches!(event, ScanEvent::Canceled))
        .count();
    (finished, canceled)
}

#[tokio::test]
async fn scan_reports_progress_and_collects_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_script(dir.path(), "fake-engine", WORKING_ENGINE);
    let input = dir.path().join("input.xml");
    std::fs::write(&input, "<Benchmark/>").unwrap();

    let session = Arc::new(ScanSession::new(&input));
    let (sink, mut events) = EventSink::channel();
    let mut scanner = LocalScanner::new(&test_config(engine), session, ScanMode::Scan, sink);

    let outcome = scanner.evaluate().await;
    assert_eq!(outcome, Outcome::Finished);

    let all = drain(&mut events);
    let progress: Vec<_> = all
        .iter()
        .filter_map(|event| match event {
            ScanEvent::Progress(progress) => Some((progress.rule.as_str(), &progress.status)),
            _ => None,
        })
        .collect();
    assert_eq!(
        progress,
        vec![
            ("rule1", &RuleStatus::Processing),
            ("rule1", &RuleStatus::Pass),
        ]
    );
    let (finished, canceled) = terminal_events(&all);
    assert_eq!((finished, canceled), (1, 0));
    assert!(matches!(all.last(), Some(ScanEvent::Finished)));

    assert_eq!(scanner.results().unwrap(), b"<TestResult/>\n");
    assert_eq!(scanner.report().unwrap(), b"<html/>\n");
    assert_eq!(scanner.arf().unwrap(), b"<arf/>\n");
    assert!(scanner.capabilities().progress_reporting());
}

#[tokio::test]
async fn probe_failure_ends_canceled_without_progress() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_script(dir.path(), "broken-engine", "#!/bin/sh\nexit 1\n");
    let input = dir.path().join("input.xml");
    std::fs::write(&input, "<Benchmark/>").unwrap();

    let session = Arc::new(ScanSession::new(&input));
    let (sink, mut events) = EventSink::channel();
    let mut scanner = LocalScanner::new(&test_config(engine), session, ScanMode::Scan, sink);

    let outcome = scanner.evaluate().await;
    assert_eq!(outcome, Outcome::Canceled);

    let all = drain(&mut events);
    let errors = all
        .iter()
        .filter(|event| {
            matches!(
                event,
                ScanEvent::Message {
                    level: MessageLevel::Error,
                    ..
                }
            )
        })
        .count();
    assert_eq!(errors, 1);
    assert!(
        !all.iter()
            .any(|event| matches!(event, ScanEvent::Progress(_)))
    );
    let (finished, canceled) = terminal_events(&all);
    assert_eq!((finished, canceled), (0, 1));

    assert!(scanner.results().is_err());
    assert!(scanner.report().is_err());
    assert!(scanner.arf().is_err());
}

#[tokio::test]
async fn capability_mismatch_is_terminal() {
    let dir = tempfile::tempdir().unwrap();
    // 0.9.4 probes fine but predates online remediation.
    let engine = write_script(
        dir.path(),
        "old-engine",
        "#!/bin/sh\nprintf 'oscap 0.9.4\\n'\nexit 0\n",
    );
    let input = dir.path().join("input.xml");
    std::fs::write(&input, "<Benchmark/>").unwrap();

    let session = Arc::new(ScanSession::new(&input));
    let (sink, mut events) = EventSink::channel();
    let mut scanner = LocalScanner::new(
        &test_config(engine),
        session,
        ScanMode::ScanWithRemediation,
        sink,
    );

    let outcome = scanner.evaluate().await;
    assert_eq!(outcome, Outcome::Canceled);

    let all = drain(&mut events);
    assert!(all.iter().any(|event| matches!(
        event,
        ScanEvent::Message {
            level: MessageLevel::Error,
            ..
        }
    )));
    assert!(scanner.results().is_err());
}

#[tokio::test]
async fn cancel_mid_run_kills_a_stubborn_engine_once() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_script(
        dir.path(),
        "stubborn-engine",
        r#"#!/bin/sh
if [ "$1" = "--version" ]; then
    printf 'OpenSCAP command line tool (oscap) 1.2.17\n'
    exit 0
fi
trap '' TERM
printf 'rule1:pass\n'
sleep 30 &
wait
"#,
    );
    let input = dir.path().join("input.xml");
    std::fs::write(&input, "<Benchmark/>").unwrap();

    let session = Arc::new(ScanSession::new(&input));
    let (sink, mut events) = EventSink::channel();
    let mut scanner = LocalScanner::new(&test_config(engine), session, ScanMode::Scan, sink);

    let cancel = scanner.cancel_flag();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.request();
    });

    let outcome = scanner.evaluate().await;
    assert_eq!(outcome, Outcome::Canceled);

    let all = drain(&mut events);
    let (finished, canceled) = terminal_events(&all);
    assert_eq!((finished, canceled), (0, 1));
    assert!(scanner.results().is_err());
}

#[tokio::test]
async fn dry_run_previews_the_command_line() {
    let dir = tempfile::tempdir().unwrap();
    // Never executed; the path does not even have to exist.
    let engine = dir.path().join("absent-engine");
    let input = dir.path().join("input.xml");
    std::fs::write(&input, "<Benchmark/>").unwrap();

    let mut session = ScanSession::new(&input);
    session.profile_id = Some("xccdf_profile".to_string());
    let (sink, mut events) = EventSink::channel();
    let mut scanner = LocalScanner::new(
        &test_config(engine),
        Arc::new(session),
        ScanMode::Scan,
        sink,
    )
    .dry_run(true);

    let outcome = scanner.evaluate().await;
    assert_eq!(outcome, Outcome::Finished);

    let all = drain(&mut events);
    let preview = all.iter().find_map(|event| match event {
        ScanEvent::Message {
            level: MessageLevel::Info,
            text,
        } => Some(text.clone()),
        _ => None,
    });
    let preview = preview.expect("dry run should emit a command preview");
    assert!(preview.contains("xccdf eval"));
    assert!(preview.contains("--profile xccdf_profile"));
    assert!(preview.contains("--progress"));
    assert!(
        !all.iter()
            .any(|event| matches!(event, ScanEvent::Progress(_)))
    );
}

#[tokio::test]
async fn engine_failure_exit_code_ends_canceled() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_script(
        dir.path(),
        "failing-engine",
        r#"#!/bin/sh
if [ "$1" = "--version" ]; then
    printf 'OpenSCAP command line tool (oscap) 1.2.17\n'
    exit 0
fi
echo 'OpenSCAP Error: something broke' >&2
exit 2
"#,
    );
    let input = dir.path().join("input.xml");
    std::fs::write(&input, "<Benchmark/>").unwrap();

    let session = Arc::new(ScanSession::new(&input));
    let (sink, mut events) = EventSink::channel();
    let mut scanner = LocalScanner::new(&test_config(engine), session, ScanMode::Scan, sink);

    let outcome = scanner.evaluate().await;
    assert_eq!(outcome, Outcome::Canceled);

    let all = drain(&mut events);
    // The stderr line was relayed as a warning, the exit as an error.
    assert!(all.iter().any(|event| matches!(
        event,
        ScanEvent::Message { level: MessageLevel::Warning, text } if text.contains("something broke")
    )));
    assert!(all.iter().any(|event| matches!(
        event,
        ScanEvent::Message { level: MessageLevel::Error, text } if text.contains("status 2")
    )));
}
