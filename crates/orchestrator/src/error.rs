#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to launch `{command}`: {source}")]
    ProcessLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Remote command exited with status {status}: {detail}")]
    RemoteOp { status: i32, detail: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Engine does not support the requested operation: {0}")]
    CapabilityMismatch(String),

    #[error("Operation not valid in the current state: {0}")]
    InvalidState(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
