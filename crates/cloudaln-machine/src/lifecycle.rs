//! The three operations a fleet pipeline performs on a node.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::error;

use cloudaln_core::{NodeHandle, NodeId, RunOutcome, RunRequest};

use crate::container::run_container;
use crate::error::ProvisionError;
use crate::provisioner::Provisioner;
use crate::transport::{EngineConnector, TlsConnector};

/// Provision, run on, and destroy nodes.
///
/// Implementations must be safe to share between concurrent pipelines.
#[async_trait]
pub trait NodeLifecycle: Send + Sync {
    /// Provision a node. A failed provision has already cleaned up after
    /// itself.
    async fn provision(&self) -> Result<NodeHandle, ProvisionError>;

    /// Run a container on `node` to completion.
    async fn run(&self, node: &NodeHandle, request: &RunRequest) -> RunOutcome;

    /// Destroy a node, returning the removal's exit status.
    async fn destroy(&self, node: &NodeId) -> i32;
}

/// [`NodeLifecycle`] backed by the fleet tool and the engine's TLS API.
#[derive(Clone)]
pub struct MachineLifecycle {
    provisioner: Provisioner,
    connector: Arc<dyn EngineConnector>,
}

impl MachineLifecycle {
    /// Create a lifecycle that connects over TLS with no request timeout.
    pub fn new(provisioner: Provisioner) -> Self {
        Self {
            provisioner,
            connector: Arc::new(TlsConnector::default()),
        }
    }

    /// Bound pull, create and start requests. Wait is never bounded.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.connector = Arc::new(TlsConnector::new(Some(timeout)));
        self
    }

    /// Reach node engines through `connector` instead of TLS.
    pub fn with_connector(mut self, connector: Arc<dyn EngineConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }
}

#[async_trait]
impl NodeLifecycle for MachineLifecycle {
    async fn provision(&self) -> Result<NodeHandle, ProvisionError> {
        self.provisioner.provision().await
    }

    async fn run(&self, node: &NodeHandle, request: &RunRequest) -> RunOutcome {
        match self.connector.connect(node).await {
            Ok(transport) => run_container(transport.as_ref(), request).await,
            Err(e) => {
                error!(node = %node.id(), error = %e, "Failed to set up engine transport");
                RunOutcome::ProtocolFailure
            }
        }
    }

    async fn destroy(&self, node: &NodeId) -> i32 {
        self.provisioner.destroy(node).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverConfig;
    use crate::tool::DockerMachine;
    use cloudaln_core::{CredentialBundle, Endpoint};

    #[tokio::test]
    async fn test_run_without_credentials_is_protocol_failure() {
        let lifecycle = MachineLifecycle::new(Provisioner::new(
            Arc::new(DockerMachine::default()),
            DriverConfig::local(),
        ))
        .with_request_timeout(Duration::from_secs(5));

        let node = NodeHandle::new(
            NodeId::new("cloud-aln-test"),
            Endpoint::new("127.0.0.1", 2376),
            CredentialBundle::new("/nonexistent/cloud-aln/certs"),
            2,
        );
        let request = RunRequest::new("alpine", vec!["true".to_string()]);

        assert_eq!(lifecycle.run(&node, &request).await, RunOutcome::ProtocolFailure);
    }
}
