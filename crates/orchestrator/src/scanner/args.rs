#![forbid(unsafe_code)]

use crate::capability::Capabilities;
use crate::error::Error;
use config::{ScanMode, ScanSession};

/// Where one run's input and output artifacts live, local or remote.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub input: String,
    pub tailoring: Option<String>,
    pub results: String,
    pub report: String,
    pub arf: String,
}

/// Argument vector for the capability probe.
pub fn probe_args() -> Vec<String> {
    vec!["--version".to_string()]
}

/// Build the full engine argument vector for one run.
///
/// Flag names are the wire contract with the engine and are reproduced
/// exactly; gated flags (`--progress`, `--remediate`, datastream ids)
/// appear only when the capability snapshot allows them.
pub fn build_args(
    mode: ScanMode,
    session: &ScanSession,
    caps: &Capabilities,
    paths: &ArtifactPaths,
) -> Vec<String> {
    match mode {
        ScanMode::Scan | ScanMode::ScanWithRemediation => {
            evaluation_args(mode, session, caps, paths)
        }
        ScanMode::OfflineRemediation => offline_remediation_args(session, caps, paths),
    }
}

fn evaluation_args(
    mode: ScanMode,
    session: &ScanSession,
    caps: &Capabilities,
    paths: &ArtifactPaths,
) -> Vec<String> {
    let mut args = vec!["xccdf".to_string(), "eval".to_string()];

    if caps.source_datastreams() {
        if let Some(datastream_id) = &session.datastream_id {
            args.push("--datastream-id".to_string());
            args.push(datastream_id.clone());
        }
        if let Some(component_id) = &session.component_id {
            args.push("--xccdf-id".to_string());
            args.push(component_id.clone());
        }
    }

    if let Some(profile_id) = &session.profile_id {
        args.push("--profile".to_string());
        args.push(profile_id.clone());
    }

    args.push("--results".to_string());
    args.push(paths.results.clone());
    args.push("--report".to_string());
    args.push(paths.report.clone());
    args.push("--results-arf".to_string());
    args.push(paths.arf.clone());

    if let Some(tailoring) = &paths.tailoring {
        args.push("--tailoring-file".to_string());
        args.push(tailoring.clone());
    }

    if session.skip_validation {
        args.push("--skip-valid".to_string());
    }
    if session.fetch_remote_resources {
        args.push("--fetch-remote-resources".to_string());
    }
    if caps.progress_reporting() {
        args.push("--progress".to_string());
    }
    if mode == ScanMode::ScanWithRemediation {
        args.push("--remediate".to_string());
    }

    args.push(paths.input.clone());
    args
}

fn offline_remediation_args(
    session: &ScanSession,
    caps: &Capabilities,
    paths: &ArtifactPaths,
) -> Vec<String> {
    let mut args = vec!["xccdf".to_string(), "remediate".to_string()];

    args.push("--results".to_string());
    args.push(paths.results.clone());
    args.push("--report".to_string());
    args.push(paths.report.clone());
    args.push("--results-arf".to_string());
    args.push(paths.arf.clone());

    if session.skip_validation {
        args.push("--skip-valid".to_string());
    }
    if caps.progress_reporting() {
        args.push("--progress".to_string());
    }

    args.push(paths.input.clone());
    args
}

/// Validate the requested mode and session against the probed
/// capabilities before anything is staged or run.
pub fn check_prerequisites(
    mode: ScanMode,
    session: &ScanSession,
    caps: &Capabilities,
) -> Result<(), Error> {
    if !caps.baseline() {
        return Err(Error::CapabilityMismatch(
            "the installed engine version is too old to be usable".to_string(),
        ));
    }
    if mode == ScanMode::ScanWithRemediation && !caps.online_remediation() {
        return Err(Error::CapabilityMismatch(
            "online remediation was requested but the engine does not support it".to_string(),
        ));
    }
    if mode == ScanMode::OfflineRemediation && !caps.arf_input() {
        return Err(Error::CapabilityMismatch(
            "offline remediation requires result-bundle input, which the engine does not support"
                .to_string(),
        ));
    }
    if session.uses_datastreams() && !caps.source_datastreams() {
        return Err(Error::CapabilityMismatch(
            "the session selects a datastream but the engine does not support source datastreams"
                .to_string(),
        ));
    }
    if session.tailoring_path.is_some() && !caps.tailoring() {
        return Err(Error::CapabilityMismatch(
            "a tailoring file is present but the engine does not support tailoring".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> ArtifactPaths {
        ArtifactPaths {
            input: "/tmp/input.xml".to_string(),
            tailoring: None,
            results: "/tmp/results.xml".to_string(),
            report: "/tmp/report.html".to_string(),
            arf: "/tmp/arf.xml".to_string(),
        }
    }

    fn full_caps() -> Capabilities {
        Capabilities::parse("oscap 1.2.17\n")
    }

    #[test]
    fn evaluation_shape() {
        let mut session = ScanSession::new("/tmp/input.xml");
        session.profile_id = Some("xccdf_profile".to_string());
        let args = build_args(ScanMode::Scan, &session, &full_caps(), &paths());
        assert_eq!(args[0..2], ["xccdf", "eval"]);
        assert!(args.contains(&"--profile".to_string()));
        assert!(args.contains(&"--progress".to_string()));
        assert!(!args.contains(&"--remediate".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/input.xml");
    }

    #[test]
    fn remediate_flag_only_for_online_remediation() {
        let session = ScanSession::new("/tmp/input.xml");
        let args = build_args(
            ScanMode::ScanWithRemediation,
            &session,
            &full_caps(),
            &paths(),
        );
        assert!(args.contains(&"--remediate".to_string()));
        assert_eq!(args[0..2], ["xccdf", "eval"]);
    }

    #[test]
    fn offline_remediation_uses_remediate_subcommand() {
        let session = ScanSession::new("/tmp/arf-input.xml");
        let args = build_args(
            ScanMode::OfflineRemediation,
            &session,
            &full_caps(),
            &paths(),
        );
        assert_eq!(args[0..2], ["xccdf", "remediate"]);
        assert!(!args.contains(&"--profile".to_string()));
    }

    #[test]
    fn progress_gated_on_capability() {
        let session = ScanSession::new("/tmp/input.xml");
        let old_caps = Capabilities::parse("oscap 0.9.2\n");
        let args = build_args(ScanMode::Scan, &session, &old_caps, &paths());
        assert!(!args.contains(&"--progress".to_string()));
    }

    #[test]
    fn datastream_ids_gated_on_capability() {
        let mut session = ScanSession::new("/tmp/input.xml");
        session.datastream_id = Some("ds".to_string());
        session.component_id = Some("comp".to_string());

        let args = build_args(ScanMode::Scan, &session, &full_caps(), &paths());
        assert!(args.contains(&"--datastream-id".to_string()));
        assert!(args.contains(&"--xccdf-id".to_string()));

        let old_caps = Capabilities::parse("oscap 0.8.9\n");
        let args = build_args(ScanMode::Scan, &session, &old_caps, &paths());
        assert!(!args.contains(&"--datastream-id".to_string()));
    }

    #[test]
    fn skip_valid_and_fetch_flags() {
        let mut session = ScanSession::new("/tmp/input.xml");
        session.skip_validation = true;
        session.fetch_remote_resources = true;
        let args = build_args(ScanMode::Scan, &session, &full_caps(), &paths());
        assert!(args.contains(&"--skip-valid".to_string()));
        assert!(args.contains(&"--fetch-remote-resources".to_string()));
    }

    #[test]
    fn tailoring_path_is_passed_through() {
        let session = ScanSession::new("/tmp/input.xml");
        let mut with_tailoring = paths();
        with_tailoring.tailoring = Some("/tmp/tailoring.xml".to_string());
        let args = build_args(ScanMode::Scan, &session, &full_caps(), &with_tailoring);
        let index = args
            .iter()
            .position(|arg| arg == "--tailoring-file")
            .unwrap();
        assert_eq!(args[index + 1], "/tmp/tailoring.xml");
    }

    #[test]
    fn prerequisites_reject_unsupported_requests() {
        let caps = Capabilities::parse("oscap 0.9.4\n");
        let session = ScanSession::new("/tmp/input.xml");

        assert!(check_prerequisites(ScanMode::Scan, &session, &caps).is_ok());
        assert!(matches!(
            check_prerequisites(ScanMode::ScanWithRemediation, &session, &caps),
            Err(Error::CapabilityMismatch(_))
        ));

        let mut tailored = session.clone();
        tailored.tailoring_path = Some("/tmp/tailoring.xml".into());
        assert!(matches!(
            check_prerequisites(ScanMode::Scan, &tailored, &caps),
            Err(Error::CapabilityMismatch(_))
        ));

        let ancient = Capabilities::parse("oscap 0.7.0\n");
        assert!(matches!(
            check_prerequisites(ScanMode::Scan, &session, &ancient),
            Err(Error::CapabilityMismatch(_))
        ));
    }
}
