//! Provisioned node description.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::NodeId;

/// Network endpoint of a node's container-engine API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// HTTPS base URL for this endpoint.
    pub fn https_url(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = CoreError;

    /// Parse `host:port`. The split is on the last colon so bracketed IPv6
    /// hosts keep their inner colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| CoreError::InvalidEndpoint(s.to_string()))?;

        if host.is_empty() {
            return Err(CoreError::InvalidEndpoint(s.to_string()));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| CoreError::InvalidEndpoint(s.to_string()))?;

        Ok(Self::new(host, port))
    }
}

/// Directory holding the client certificate, private key and CA certificate
/// for mutual TLS with a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBundle {
    dir: PathBuf,
}

impl CredentialBundle {
    /// Create a bundle rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Client certificate (PEM).
    pub fn client_cert(&self) -> PathBuf {
        self.dir.join("cert.pem")
    }

    /// Client private key (PEM).
    pub fn client_key(&self) -> PathBuf {
        self.dir.join("key.pem")
    }

    /// CA certificate the engine's server certificate is signed by (PEM).
    pub fn ca_cert(&self) -> PathBuf {
        self.dir.join("ca.pem")
    }
}

/// One provisioned compute node.
///
/// Only the provisioner builds these, and they are never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHandle {
    id: NodeId,
    endpoint: Endpoint,
    credentials: CredentialBundle,
    parallelism: u32,
    provisioned_at: DateTime<Utc>,
}

impl NodeHandle {
    /// Create a new NodeHandle.
    pub fn new(
        id: NodeId,
        endpoint: Endpoint,
        credentials: CredentialBundle,
        parallelism: u32,
    ) -> Self {
        Self {
            id,
            endpoint,
            credentials,
            parallelism,
            provisioned_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn credentials(&self) -> &CredentialBundle {
        &self.credentials
    }

    /// Core count hint used to size the workload command.
    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    pub fn provisioned_at(&self) -> DateTime<Utc> {
        self.provisioned_at
    }
}
