//! Error types for magicmount

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for magicmount operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be read or written
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration was read but is not usable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// A mount syscall failed
    #[error("Failed to {tag} mount {src:?} -> {dest:?}: {source}")]
    Mount {
        tag: String,
        src: PathBuf,
        dest: PathBuf,
        #[source]
        source: nix::Error,
    },

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a failed mount syscall
    pub fn mount(tag: &str, src: impl Into<PathBuf>, dest: impl Into<PathBuf>, err: nix::Error) -> Self {
        Error::Mount {
            tag: tag.to_string(),
            src: src.into(),
            dest: dest.into(),
            source: err,
        }
    }
}
