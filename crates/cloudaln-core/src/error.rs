//! Core domain errors.

use thiserror::Error;

/// Core domain errors for cloud-aln.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Endpoint string could not be parsed as `host:port`.
    #[error("Invalid endpoint '{0}': expected host:port")]
    InvalidEndpoint(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
}
