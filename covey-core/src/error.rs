//! Error types for Covey

use thiserror::Error;

/// Result type alias for Covey operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Covey operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Decision backend error (transport failure or undecodable output)
    #[error("Decider error: {0}")]
    Decider(String),

    /// Workflow construction or dispatch error
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
