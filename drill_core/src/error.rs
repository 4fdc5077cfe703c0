//! Error types for the drill_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for drill_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session setup error (empty batch, unknown index)
    #[error("Session error: {0}")]
    Session(String),

    /// Backend collaborator error
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Failure reported by a [`LearningApi`](crate::api::LearningApi) call.
///
/// None of these are fatal to a session; callers degrade to a fallback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Connectivity failure or timeout
    #[error("network failure: {0}")]
    Network(String),

    /// Non-success status returned by the service
    #[error("service returned {code}: {message}")]
    Status { code: u16, message: String },

    /// Response body did not match any known shape
    #[error("unexpected response: {0}")]
    Decode(String),

    /// The service already considers the session finished
    #[error("session already completed")]
    AlreadyCompleted,
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}
