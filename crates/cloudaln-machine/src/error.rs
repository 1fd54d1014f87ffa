//! Error types for node provisioning and the container protocol.

use std::path::PathBuf;

use cloudaln_core::{NodeId, RunStage, PROTOCOL_FAILURE};
use thiserror::Error;

/// Errors that can occur while provisioning a node.
///
/// Every variant is raised only after the provisioner has attempted to
/// remove the node, so no variant implies a leaked node.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The fleet tool could not be executed at all.
    #[error("Failed to run fleet tool for node {node}: {source}")]
    Spawn {
        node: NodeId,
        #[source]
        source: std::io::Error,
    },

    /// `create` exited non-zero.
    #[error("Creating node {node} failed with exit code {code}")]
    CreateFailed { node: NodeId, code: i32 },

    /// `env` exited non-zero.
    #[error("Describing node {node} failed with exit code {code}")]
    DescribeFailed { node: NodeId, code: i32 },

    /// `env` succeeded but its output lacked DOCKER_HOST or DOCKER_CERT_PATH.
    #[error("Could not parse connection settings for node {node}")]
    UnparseableDescription { node: NodeId },
}

impl ProvisionError {
    /// Identity of the node the failure belongs to.
    pub fn node(&self) -> &NodeId {
        match self {
            Self::Spawn { node, .. }
            | Self::CreateFailed { node, .. }
            | Self::DescribeFailed { node, .. }
            | Self::UnparseableDescription { node } => node,
        }
    }

    /// Process exit status this failure maps to.
    ///
    /// Tool failures propagate the tool's own code; everything else is the
    /// protocol-failure sentinel.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CreateFailed { code, .. } | Self::DescribeFailed { code, .. } => *code,
            Self::Spawn { .. } | Self::UnparseableDescription { .. } => PROTOCOL_FAILURE,
        }
    }
}

/// Errors raised by an engine transport before or during a request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A credential file could not be read.
    #[error("Failed to read credential '{path}': {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TLS setup, connection, or body transfer failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A container protocol stage failed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The request or response failed at the transport level.
    #[error("{stage}: transport error: {source}")]
    Transport {
        stage: RunStage,
        #[source]
        source: TransportError,
    },

    /// The engine answered with a status outside 2xx.
    #[error("{stage}: received invalid status code ({status})")]
    Status { stage: RunStage, status: u16 },

    /// The engine answered 2xx with a body we could not use.
    #[error("{stage}: invalid response body: {reason}")]
    InvalidBody { stage: RunStage, reason: String },
}

impl ProtocolError {
    /// Stage the failure happened in.
    pub fn stage(&self) -> RunStage {
        match self {
            Self::Transport { stage, .. }
            | Self::Status { stage, .. }
            | Self::InvalidBody { stage, .. } => *stage,
        }
    }
}
