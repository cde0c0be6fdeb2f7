use thiserror::Error;

/// Errors raised while straining a segment.
#[derive(Debug, Error)]
pub enum StrainerError {
    /// An inner strategy could not be constructed from the given options.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invariant the crawl depends on was violated.
    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Cancelled")]
    Cancelled,

    /// Malformed segment, alignment or read rejected at the boundary.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

pub type Result<T> = std::result::Result<T, StrainerError>;

impl From<StrainerError> for std::io::Error {
    fn from(err: StrainerError) -> Self {
        match err {
            StrainerError::Io(e) => e,
            StrainerError::InvalidInput(_) | StrainerError::Parse(_) => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string())
            }
            StrainerError::Cancelled => {
                std::io::Error::new(std::io::ErrorKind::Interrupted, err.to_string())
            }
            other => std::io::Error::other(other.to_string()),
        }
    }
}
