//! Workload command construction.
//!
//! Each node fetches the reference index, then for every assigned shard
//! downloads the reads, aligns them and uploads the result back to the file
//! server.

use cloudaln_core::NodeHandle;

use crate::http::{BasicCredentials, REFERENCE_EXTENSIONS};

/// Builds the container command for a node's shard set.
pub trait WorkloadBuilder: Send + Sync {
    /// Command vector for `node` processing `shards`.
    fn build(&self, shards: &[usize], node: &NodeHandle) -> Vec<String>;
}

impl<F> WorkloadBuilder for F
where
    F: Fn(&[usize], &NodeHandle) -> Vec<String> + Send + Sync,
{
    fn build(&self, shards: &[usize], node: &NodeHandle) -> Vec<String> {
        self(shards, node)
    }
}

/// Fetch / align / push script run under `bash -c`.
#[derive(Debug, Clone)]
pub struct WorkloadScript {
    base_url: String,
    credentials: Option<BasicCredentials>,
}

impl WorkloadScript {
    /// Create a script that talks to the file server at `socket_address`
    /// (`host:port`, as reachable from the nodes).
    pub fn new(socket_address: &str) -> Self {
        Self {
            base_url: format!("http://{}", socket_address.trim_end_matches('/')),
            credentials: None,
        }
    }

    /// Authenticate every transfer with `credentials`.
    pub fn with_credentials(mut self, credentials: Option<BasicCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Individual steps, in order.
    pub fn steps(&self, shards: &[usize], cores: u32) -> Vec<String> {
        let curl = self.curl();
        let mut steps: Vec<String> = REFERENCE_EXTENSIONS
            .iter()
            .map(|ext| format!("{} -o ./ref.{} {}/ref.{}", curl, ext, self.base_url, ext))
            .collect();

        for shard in shards {
            steps.push(format!(
                "{} -o ./shard-{} {}/{}",
                curl, shard, self.base_url, shard
            ));
            steps.push(format!(
                "bwa mem -t {} ./ref ./shard-{} | {} -X PUT --data-binary @- {}/{}",
                cores, shard, curl, self.base_url, shard
            ));
        }

        steps
    }

    /// Full script. Any failing step fails the whole script, pipes included.
    pub fn script(&self, shards: &[usize], cores: u32) -> String {
        format!("set -o pipefail; {}", self.steps(shards, cores).join(" && "))
    }

    fn curl(&self) -> String {
        match &self.credentials {
            Some(creds) => format!("curl -fsS -u {}", shell_quote(&creds.user_pass())),
            None => "curl -fsS".to_string(),
        }
    }
}

impl WorkloadBuilder for WorkloadScript {
    fn build(&self, shards: &[usize], node: &NodeHandle) -> Vec<String> {
        vec![
            "/bin/bash".to_string(),
            "-c".to_string(),
            self.script(shards, node.parallelism()),
        ]
    }
}

/// Single-quote `value` for bash.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
