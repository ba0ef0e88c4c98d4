#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid scan mode: {0}")]
    InvalidScanMode(String),

    #[error("Invalid fix type: {0}")]
    InvalidFixType(String),

    #[error("Failed to serialize TOML: {0}")]
    SerializeTOML(#[from] toml_edit::ser::Error),

    #[error("Failed to deserialize TOML: {0}")]
    DeserializeTOML(#[from] toml_edit::de::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseTOML(#[from] toml_edit::TomlError),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
}
