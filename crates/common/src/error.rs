//! Error types for uireplay

use thiserror::Error;

/// Result type alias using uireplay Error
pub type Result<T> = std::result::Result<T, Error>;

/// uireplay error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No usable browser found: {0}")]
    BrowserUnavailable(String),

    #[error("Failed to acquire browser instance: {0}")]
    Acquisition(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Step {index} failed: {message}")]
    StepFailed { index: usize, message: String },

    #[error("Timed out waiting for element {selector}")]
    ElementWait { selector: String },

    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    #[error("Screenshot capture failed: {0}")]
    Screenshot(String),

    #[error("Performance metrics unavailable: {0}")]
    Metrics(String),

    #[error("Recording session already exists: {0}")]
    DuplicateSession(String),

    #[error("Recording session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid recorder state: {0}")]
    RecorderState(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Scheduler is shutting down")]
    ShuttingDown,

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Operation timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error ends the job with zero steps attempted.
    pub fn is_acquisition(&self) -> bool {
        matches!(self, Error::BrowserUnavailable(_) | Error::Acquisition(_))
    }
}
