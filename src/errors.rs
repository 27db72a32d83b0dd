use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("no downloadable streams available")]
    NoStreamsAvailable,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to start process: {0}")]
    ProcessSpawn(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("Tagging error: {0}")]
    Tagging(String),

    #[error("Download error: {0}")]
    Download(String),
}

impl AppError {
    /// Cancellation aborts the current video's pipeline but is never a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
