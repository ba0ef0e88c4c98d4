#![forbid(unsafe_code)]

pub mod cancel;
pub mod capability;
pub mod error;
pub mod events;
pub mod process;
pub mod progress;
pub mod remote;
pub mod scanner;

pub use cancel::CancelFlag;
pub use capability::Capabilities;
pub use error::Error;
pub use events::{EventSink, MessageLevel, ScanEvent};
pub use process::{ProcessRunner, RunOutcome};
pub use progress::{ProgressEvent, ProgressNote, ProgressParser, RuleStatus};
pub use remote::{RemoteFileOps, RemoteSession, shell_join, shell_quote};
pub use scanner::{
    ArtifactPaths, LocalScanner, Outcome, RemoteScanner, ScanArtifacts, Scanner, build_args,
    check_prerequisites, create_scanner, probe_args,
};
