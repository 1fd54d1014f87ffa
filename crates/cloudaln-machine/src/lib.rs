//! Node provisioning and container execution for cloud-aln.
//!
//! This crate drives the two external systems a node pipeline talks to:
//! the fleet tool (`docker-machine`) that creates, describes and removes
//! nodes, and the container engine running on each node, reached over
//! mutual TLS.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cloudaln_core::RunRequest;
//! use cloudaln_machine::{DockerMachine, DriverConfig, MachineLifecycle, NodeLifecycle, Provisioner};
//!
//! async fn run_one() -> Result<(), Box<dyn std::error::Error>> {
//!     let provisioner = Provisioner::new(Arc::new(DockerMachine::default()), DriverConfig::local());
//!     let lifecycle = MachineLifecycle::new(provisioner);
//!
//!     let node = lifecycle.provision().await?;
//!     let request = RunRequest::new("alpine", vec!["true".to_string()]);
//!     let outcome = lifecycle.run(&node, &request).await;
//!     lifecycle.destroy(node.id()).await;
//!
//!     println!("exit status: {}", outcome.exit_status());
//!     Ok(())
//! }
//! ```

mod container;
mod driver;
mod env;
mod error;
mod lifecycle;
mod provisioner;
mod tool;
mod transport;

// Re-export main types
pub use container::run_container;
pub use driver::{CloudDriver, DriverConfig};
pub use env::MachineEnv;
pub use error::{ProtocolError, ProvisionError, TransportError};
pub use lifecycle::{MachineLifecycle, NodeLifecycle};
pub use provisioner::Provisioner;
pub use tool::{DockerMachine, FleetTool, ToolOutput};
pub use transport::{
    EngineConnector, EngineRequest, EngineResponse, EngineTransport, TlsConnector,
    TlsEngineTransport,
};
