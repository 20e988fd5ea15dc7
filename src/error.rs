//! Error types for the tracker core.

/// Errors that can occur in the tracker library.
#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("API key is not configured")]
    MissingApiKey,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience result type.
pub type TrackerResult<T> = Result<T, TrackerError>;
