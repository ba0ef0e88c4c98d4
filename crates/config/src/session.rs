use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// What kind of run is requested.
///
/// The mode decides which command form is built and which input artifact
/// is required: `Scan` and `ScanWithRemediation` evaluate a plain content
/// file, `OfflineRemediation` replays fixes from a previously produced
/// result bundle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    #[default]
    Scan,
    /// Evaluate and apply fixes in the same run.
    ScanWithRemediation,
    /// Apply fixes recorded in an earlier result bundle.
    OfflineRemediation,
}

impl FromStr for ScanMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan" => Ok(ScanMode::Scan),
            "remediate" => Ok(ScanMode::ScanWithRemediation),
            "offline-remediate" => Ok(ScanMode::OfflineRemediation),
            other => Err(crate::Error::InvalidScanMode(other.to_string())),
        }
    }
}

/// Immutable description of one scan run.
///
/// Owned by the caller and read-only to the scanner; a new run takes a new
/// session. The input path is the content file for evaluation modes and
/// the result bundle for offline remediation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ScanSession {
    pub input_path: PathBuf,

    /// Customization overlay passed through to the engine untouched.
    pub tailoring_path: Option<PathBuf>,

    /// Datastream to evaluate when the input holds more than one.
    pub datastream_id: Option<String>,

    /// Checklist component within the selected datastream.
    pub component_id: Option<String>,

    pub profile_id: Option<String>,

    /// Skip input validation in the engine.
    pub skip_validation: bool,

    /// Let the engine download referenced remote resources.
    pub fetch_remote_resources: bool,
}

impl ScanSession {
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            ..Default::default()
        }
    }

    /// True when the session references ids that only make sense for
    /// source-datastream input.
    pub fn uses_datastreams(&self) -> bool {
        self.datastream_id.is_some() || self.component_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_known_names() {
        assert_eq!("scan".parse::<ScanMode>().unwrap(), ScanMode::Scan);
        assert_eq!(
            "remediate".parse::<ScanMode>().unwrap(),
            ScanMode::ScanWithRemediation
        );
        assert_eq!(
            "offline-remediate".parse::<ScanMode>().unwrap(),
            ScanMode::OfflineRemediation
        );
        assert!("evaluate".parse::<ScanMode>().is_err());
    }

    #[test]
    fn datastream_detection() {
        let mut session = ScanSession::new("/tmp/content.xml");
        assert!(!session.uses_datastreams());
        session.datastream_id = Some("ds".into());
        assert!(session.uses_datastreams());
    }
}
