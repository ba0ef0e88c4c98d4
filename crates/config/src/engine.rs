use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::path::PathBuf;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Engine {
    /// Path or name of the scan engine binary. Resolved through `PATH`
    /// when not absolute. The same value is used verbatim on remote
    /// targets, so it must be meaningful there as well.
    pub command: PathBuf,

    /// The ssh client used for connection sharing and remote commands.
    pub ssh_command: PathBuf,

    /// Optional privilege-elevation wrapper prepended to local engine
    /// invocations, e.g. `pkexec`. Empty means run as the current user.
    /// The wrapper is opaque to the scanner; it only has to accept the
    /// engine command line as its trailing arguments.
    pub elevation_command: Option<PathBuf>,

    /// How often a running child is polled for exit and the cancellation
    /// flag is observed. **Measured in milliseconds**.
    ///
    /// ## Note
    ///
    /// Lowering this makes cancellation more responsive at the cost of
    /// more wakeups; it never affects output ordering.
    #[serde_as(as = "serde_with::DurationMilliSeconds")]
    pub poll_interval: Duration,

    /// Grace window between asking a canceled child to terminate and
    /// force-killing it. **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds")]
    pub termination_grace: Duration,

    /// Keep-alive probe interval for the shared SSH channel, passed to
    /// the ssh client so idle connections survive restrictive firewalls.
    /// **Measured in seconds**.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub keepalive_interval: Duration,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            command: PathBuf::from("oscap"),
            ssh_command: PathBuf::from("ssh"),
            elevation_command: None,
            poll_interval: Duration::from_millis(100),
            termination_grace: Duration::from_millis(3000),
            keepalive_interval: Duration::from_secs(60),
        }
    }
}
