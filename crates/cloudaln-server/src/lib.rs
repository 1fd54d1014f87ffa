//! cloud-aln Fleet Server Library
//!
//! This crate provides the fleet coordinator that fans read shards out over
//! a set of ephemeral nodes, plus the HTTP file server the nodes fetch
//! inputs from and push results to.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod script;
pub mod state;

pub use config::{Cli, Config};
pub use coordinator::{Coordinator, FleetResult};
pub use error::ServerError;
pub use http::{BasicCredentials, FileServerState};
pub use script::{WorkloadBuilder, WorkloadScript};
pub use state::FleetState;
