use thiserror::Error;

use crate::fs::walker::WalkError;

/// Application-wide result type alias.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// I/O errors from filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid path provided by the user.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A configuration file could not be used.
    #[error("Config error: {0}")]
    Config(String),

    /// A deep-search walk ended abnormally.
    #[error("Walk error: {0}")]
    Walk(#[from] WalkError),
}
