//! Server errors.

use cloudaln_core::CoreError;
use thiserror::Error;

/// Errors raised while setting up or running the fleet.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid command-line or derived configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Domain error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// I/O error (listener bind, file access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
