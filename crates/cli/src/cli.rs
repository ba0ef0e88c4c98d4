use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use config::{FixType, ScanMode};
use std::path::{Path, PathBuf};

/// scaprun: compliance scanning over an external engine
///
/// scaprun drives a command-line compliance evaluator on this machine or
/// on a remote host reached over SSH, showing live per-rule progress and
/// collecting the result artifacts. A run can be canceled at any time
/// with an interrupt.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// If not provided, the default locations are checked. They are
    /// `/etc/scaprun/config.toml` and `/etc/scaprun/config.d/*.toml`,
    /// where the latter being a glob pattern. If they don't exist, the
    /// default configuration is used.
    #[arg(short, long, value_parser = validate_file)]
    pub conffile: Option<PathBuf>,

    /// Where to run the scan.
    ///
    /// `localhost` runs the engine on this machine; anything else is an
    /// SSH destination of the form `user@host[:port]`. The port
    /// defaults to 22.
    #[arg(short, long, default_value = "localhost")]
    pub target: String,

    /// Run the remote engine through sudo.
    #[arg(long)]
    pub sudo: bool,

    /// What to do: `scan`, `remediate`, or `offline-remediate`.
    #[arg(short, long, default_value = "scan", value_parser = validate_mode)]
    pub mode: ScanMode,

    /// Profile to evaluate.
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Tailoring file passed through to the engine.
    #[arg(long, value_parser = validate_file)]
    pub tailoring: Option<PathBuf>,

    /// Datastream to evaluate when the input holds more than one.
    #[arg(long)]
    pub datastream_id: Option<String>,

    /// Checklist component within the selected datastream.
    #[arg(long)]
    pub xccdf_id: Option<String>,

    /// Skip input validation in the engine.
    #[arg(long)]
    pub skip_valid: bool,

    /// Let the engine download referenced remote resources.
    #[arg(long)]
    pub fetch_remote_resources: bool,

    /// Print the engine command line and exit without scanning.
    #[arg(long)]
    pub dry_run: bool,

    /// Save the machine-readable results here.
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// Save the human-readable report here.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Save the archive-format results here.
    #[arg(long)]
    pub arf: Option<PathBuf>,

    /// Also generate a remediation role from the results: `bash`,
    /// `ansible`, or `puppet`.
    #[arg(long, value_parser = validate_fix, requires = "fix_output")]
    pub fix_type: Option<FixType>,

    /// Where to save the generated remediation role.
    #[arg(long, requires = "fix_type")]
    pub fix_output: Option<PathBuf>,

    /// Content file to evaluate, or the result bundle to replay for
    /// offline remediation.
    #[arg(value_parser = validate_file)]
    pub input: PathBuf,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}

/// Parse the scan mode name.
#[inline(always)]
fn validate_mode(mode: &str) -> Result<ScanMode, String> {
    mode.parse().map_err(|err| format!("{err}"))
}

/// Parse the remediation role flavor.
#[inline(always)]
fn validate_fix(fix: &str) -> Result<FixType, String> {
    fix.parse().map_err(|err| format!("{err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_modes_parse() {
        assert_eq!(validate_mode("scan").unwrap(), ScanMode::Scan);
        assert_eq!(
            validate_mode("remediate").unwrap(),
            ScanMode::ScanWithRemediation
        );
        assert_eq!(
            validate_mode("offline-remediate").unwrap(),
            ScanMode::OfflineRemediation
        );
    }

    proptest! {
        #[test]
        fn test_validate_mode(mode in ".*") {
            let result = validate_mode(&mode);
            match result {
                Ok(_) => prop_assert!(
                    ["scan", "remediate", "offline-remediate"].contains(&mode.as_str())
                ),
                Err(err) => prop_assert!(err.contains("Invalid scan mode")),
            }
        }
    }
}
