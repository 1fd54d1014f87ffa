//! Node provisioning.

use std::sync::Arc;

use tracing::{error, info, warn};

use cloudaln_core::{NodeHandle, NodeId, PROTOCOL_FAILURE};

use crate::driver::DriverConfig;
use crate::env::MachineEnv;
use crate::error::ProvisionError;
use crate::tool::FleetTool;

/// Creates and destroys nodes through a [`FleetTool`].
#[derive(Clone)]
pub struct Provisioner {
    tool: Arc<dyn FleetTool>,
    driver: DriverConfig,
}

impl Provisioner {
    /// Create a provisioner that creates nodes with `driver`.
    pub fn new(tool: Arc<dyn FleetTool>, driver: DriverConfig) -> Self {
        Self { tool, driver }
    }

    pub fn driver(&self) -> &DriverConfig {
        &self.driver
    }

    /// Provision a node under a freshly generated identity.
    pub async fn provision(&self) -> Result<NodeHandle, ProvisionError> {
        self.provision_as(NodeId::generate()).await
    }

    /// Provision a node named `node`.
    ///
    /// On any failure the node is removed before the error is returned, so a
    /// partially created node is never left behind.
    pub async fn provision_as(&self, node: NodeId) -> Result<NodeHandle, ProvisionError> {
        info!(node = %node, driver = self.driver.name(), "Creating node");

        let code = match self.tool.create(&node, &self.driver.create_args()).await {
            Ok(code) => code,
            Err(source) => {
                return Err(self.abandon(ProvisionError::Spawn { node, source }).await);
            }
        };

        if code != 0 {
            return Err(self.abandon(ProvisionError::CreateFailed { node, code }).await);
        }

        let output = match self.tool.env(&node).await {
            Ok(output) => output,
            Err(source) => {
                return Err(self.abandon(ProvisionError::Spawn { node, source }).await);
            }
        };

        if output.code != 0 {
            let code = output.code;
            return Err(self.abandon(ProvisionError::DescribeFailed { node, code }).await);
        }

        let connection = output
            .stdout_text()
            .and_then(|text| MachineEnv::parse(text).connection());
        let Some((endpoint, credentials)) = connection else {
            return Err(self.abandon(ProvisionError::UnparseableDescription { node }).await);
        };

        info!(
            node = %node,
            endpoint = %endpoint,
            cert_path = %credentials.dir().display(),
            "Node ready"
        );

        Ok(NodeHandle::new(
            node,
            endpoint,
            credentials,
            self.driver.parallelism(),
        ))
    }

    /// Remove a node and return the fleet tool's exit status.
    ///
    /// Never fails: a node that is already gone simply yields the tool's
    /// non-zero status, and a tool that cannot run yields the sentinel.
    pub async fn destroy(&self, node: &NodeId) -> i32 {
        info!(node = %node, "Destroying node");

        match self.tool.remove(node).await {
            Ok(0) => {
                info!(node = %node, "Node destroyed");
                0
            }
            Ok(code) => {
                warn!(node = %node, exit_code = code, "Node removal reported failure");
                code
            }
            Err(e) => {
                error!(node = %node, error = %e, "Failed to run node removal");
                PROTOCOL_FAILURE
            }
        }
    }

    async fn abandon(&self, err: ProvisionError) -> ProvisionError {
        error!(node = %err.node(), error = %err, "Provisioning failed, removing node");
        self.destroy(err.node()).await;
        err
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::tool::ToolOutput;

    const GOOD_ENV: &str = "export DOCKER_HOST=\"tcp://192.168.99.100:2376\"\n\
                            export DOCKER_CERT_PATH=\"/certs/node\"\n";

    /// Fleet tool that records calls and returns canned results.
    struct MockTool {
        create_code: i32,
        env_output: ToolOutput,
        remove_code: i32,
        calls: Mutex<Vec<String>>,
    }

    impl MockTool {
        fn new(create_code: i32, env_code: i32, env_stdout: impl Into<Vec<u8>>) -> Self {
            Self {
                create_code,
                env_output: ToolOutput::new(env_code, env_stdout),
                remove_code: 0,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, op: &str) -> usize {
            self.calls()
                .iter()
                .filter(|c| c.split(' ').next() == Some(op))
                .count()
        }
    }

    #[async_trait]
    impl FleetTool for MockTool {
        async fn create(&self, node: &NodeId, driver_args: &[String]) -> io::Result<i32> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create {} {}", driver_args.join(" "), node));
            Ok(self.create_code)
        }

        async fn env(&self, node: &NodeId) -> io::Result<ToolOutput> {
            self.calls.lock().unwrap().push(format!("env {}", node));
            Ok(self.env_output.clone())
        }

        async fn remove(&self, node: &NodeId) -> io::Result<i32> {
            self.calls.lock().unwrap().push(format!("rm {}", node));
            Ok(self.remove_code)
        }
    }

    fn provisioner(tool: &Arc<MockTool>, driver: DriverConfig) -> Provisioner {
        Provisioner::new(tool.clone(), driver)
    }

    #[tokio::test]
    async fn test_provision_success() {
        let tool = Arc::new(MockTool::new(0, 0, GOOD_ENV));
        let handle = provisioner(&tool, DriverConfig::cloud("proj"))
            .provision()
            .await
            .unwrap();

        assert!(handle.id().as_str().starts_with("cloud-aln-"));
        assert_eq!(handle.endpoint().to_string(), "192.168.99.100:2376");
        assert_eq!(handle.credentials().dir().to_str(), Some("/certs/node"));
        assert_eq!(handle.parallelism(), 16);
        assert_eq!(tool.count("rm"), 0);
        assert!(tool.calls()[0].contains("--google-project proj"));
    }

    #[tokio::test]
    async fn test_local_parallelism() {
        let tool = Arc::new(MockTool::new(0, 0, GOOD_ENV));
        let handle = provisioner(&tool, DriverConfig::local())
            .provision()
            .await
            .unwrap();
        assert_eq!(handle.parallelism(), 2);
    }

    #[tokio::test]
    async fn test_create_failure_removes_node_first() {
        let tool = Arc::new(MockTool::new(3, 0, GOOD_ENV));
        let node = NodeId::new("cloud-aln-create-fails");
        let err = provisioner(&tool, DriverConfig::local())
            .provision_as(node.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::CreateFailed { code: 3, .. }));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(
            tool.calls(),
            vec![
                "create --driver virtualbox cloud-aln-create-fails".to_string(),
                "rm cloud-aln-create-fails".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_describe_failure_propagates_code() {
        let tool = Arc::new(MockTool::new(0, 5, ""));
        let err = provisioner(&tool, DriverConfig::local())
            .provision()
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::DescribeFailed { code: 5, .. }));
        assert_eq!(err.exit_code(), 5);
        assert_eq!(tool.count("rm"), 1);
    }

    #[tokio::test]
    async fn test_missing_cert_path_is_parse_failure() {
        let tool = Arc::new(MockTool::new(
            0,
            0,
            "export DOCKER_HOST=\"tcp://192.168.99.100:2376\"\n",
        ));
        let node = NodeId::new("cloud-aln-no-certs");
        let err = provisioner(&tool, DriverConfig::local())
            .provision_as(node.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::UnparseableDescription { .. }));
        assert_eq!(err.exit_code(), PROTOCOL_FAILURE);
        assert_eq!(err.node(), &node);
        assert_eq!(tool.count("rm"), 1);
        assert_eq!(tool.calls().last().unwrap(), "rm cloud-aln-no-certs");
    }

    #[tokio::test]
    async fn test_non_utf8_description_is_parse_failure() {
        let mut stdout = b"export DOCKER_HOST=\"tcp://192.168.99.100:2376\"\n".to_vec();
        stdout.extend_from_slice(b"export DOCKER_CERT_PATH=\"/certs/\xffnode\"\n");
        let tool = Arc::new(MockTool::new(0, 0, stdout));
        let node = NodeId::new("cloud-aln-latin1");
        let err = provisioner(&tool, DriverConfig::local())
            .provision_as(node.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::UnparseableDescription { .. }));
        assert_eq!(err.exit_code(), PROTOCOL_FAILURE);
        assert_eq!(tool.count("rm"), 1);
    }

    #[tokio::test]
    async fn test_destroy_twice_is_not_fatal() {
        let mut tool = MockTool::new(0, 0, GOOD_ENV);
        tool.remove_code = 1;
        let tool = Arc::new(tool);
        let provisioner = provisioner(&tool, DriverConfig::local());
        let node = NodeId::new("cloud-aln-gone");

        assert_eq!(provisioner.destroy(&node).await, 1);
        assert_eq!(provisioner.destroy(&node).await, 1);
        assert_eq!(tool.count("rm"), 2);
    }
}
