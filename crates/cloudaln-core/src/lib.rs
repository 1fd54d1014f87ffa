//! cloud-aln Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Subprocesses
//! - Runtime specifics
//!
//! All types here describe nodes, container runs and shards as the rest of
//! the workspace sees them.

pub mod container;
pub mod error;
pub mod ids;
pub mod node;
pub mod shard;
pub mod status;
pub mod token;

// Re-export commonly used types
pub use container::{RunOutcome, RunRequest, PROTOCOL_FAILURE};
pub use error::CoreError;
pub use ids::NodeId;
pub use node::{CredentialBundle, Endpoint, NodeHandle};
pub use shard::{clamp_node_count, partition, shards_for_node};
pub use status::{NodeStage, RunStage};
pub use token::random_token;
