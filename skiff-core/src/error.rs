//! Error types for decoding job payloads and scripts

use thiserror::Error;

/// Errors raised while turning raw payload bytes into a [`JobRecord`](crate::JobRecord)
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes are not JSON, or do not match the schema of their version
    #[error("malformed job payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload carries no `version` discriminator
    #[error("job payload has no version")]
    MissingVersion,

    /// The `version` discriminator names a schema this agent does not know
    #[error("unsupported job payload version: {0}")]
    UnsupportedVersion(String),
}

/// Errors raised while extracting the job script
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("unsupported job script encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("job script is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("job script is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}
