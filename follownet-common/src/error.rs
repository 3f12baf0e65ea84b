//! Common error types for FollowNet

use thiserror::Error;

/// Common result type for FollowNet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across FollowNet crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Encoding or decoding of an event or record failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
