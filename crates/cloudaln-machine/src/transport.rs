//! Transport to a node's container-engine API.

use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client, ClientBuilder, Identity};
use tracing::debug;

use cloudaln_core::{NodeHandle, RunStage};

use crate::error::TransportError;

/// TCP keep-alive interval for the wait request, which can stay idle for as
/// long as the workload runs.
const WAIT_KEEPALIVE: Duration = Duration::from_secs(1);

/// One `POST` to the engine API.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    /// Protocol stage issuing the request.
    pub stage: RunStage,

    /// Path below the endpoint root, e.g. `/containers/create`.
    pub path: String,

    /// Query string pairs.
    pub query: Vec<(String, String)>,

    /// JSON body, if any.
    pub body: Option<serde_json::Value>,
}

impl EngineRequest {
    /// Create a bodiless request.
    pub fn new(stage: RunStage, path: impl Into<String>) -> Self {
        Self {
            stage,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Add a query pair.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set the JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Engine reply after the body has been fully read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl EngineResponse {
    /// Create a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, for diagnostics.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Sends engine requests for one node.
#[async_trait]
pub trait EngineTransport: Send + Sync {
    /// Send `request` and read the whole response body.
    async fn send(&self, request: EngineRequest) -> Result<EngineResponse, TransportError>;
}

/// HTTPS transport authenticating with the node's credential bundle.
pub struct TlsEngineTransport {
    base_url: String,
    client: Client,
    wait_client: Client,
}

impl TlsEngineTransport {
    /// Load `node`'s credentials and build its clients.
    ///
    /// `request_timeout` bounds pull, create and start. The wait request is
    /// never given a timeout.
    pub async fn connect(
        node: &NodeHandle,
        request_timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        let bundle = node.credentials();
        let cert = read_pem(bundle.client_cert()).await?;
        let key = read_pem(bundle.client_key()).await?;
        let ca = read_pem(bundle.ca_cert()).await?;

        // rustls takes the identity as one PEM holding certificate and key.
        let mut identity_pem = cert;
        identity_pem.push(b'\n');
        identity_pem.extend_from_slice(&key);

        let identity = Identity::from_pem(&identity_pem)?;
        let ca = Certificate::from_pem(&ca)?;

        let base = || -> ClientBuilder {
            Client::builder()
                .use_rustls_tls()
                .tls_built_in_root_certs(false)
                .add_root_certificate(ca.clone())
                .identity(identity.clone())
        };

        let mut client = base();
        if let Some(timeout) = request_timeout {
            client = client.timeout(timeout);
        }

        let wait_client = base().tcp_keepalive(WAIT_KEEPALIVE);

        debug!(node = %node.id(), endpoint = %node.endpoint(), "Engine transport ready");

        Ok(Self {
            base_url: node.endpoint().https_url(),
            client: client.build()?,
            wait_client: wait_client.build()?,
        })
    }
}

#[async_trait]
impl EngineTransport for TlsEngineTransport {
    async fn send(&self, request: EngineRequest) -> Result<EngineResponse, TransportError> {
        let client = if request.stage == RunStage::Waiting {
            &self.wait_client
        } else {
            &self.client
        };

        let url = format!("{}{}", self.base_url, request.path);
        debug!(stage = %request.stage, url = %url, "Engine request");

        let mut builder = client.post(&url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let mut response = builder.send().await?;
        let status = response.status().as_u16();

        // The pull stream is progress chatter; drain it and keep it only
        // when it explains a failure.
        let keep_body = request.stage != RunStage::Pulling || !(200..300).contains(&status);
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if keep_body {
                body.extend_from_slice(&chunk);
            }
        }

        Ok(EngineResponse { status, body })
    }
}

/// Opens an [`EngineTransport`] to a provisioned node.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn connect(&self, node: &NodeHandle) -> Result<Box<dyn EngineTransport>, TransportError>;
}

/// Connector that builds a [`TlsEngineTransport`] from the node's
/// credential bundle.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsConnector {
    request_timeout: Option<Duration>,
}

impl TlsConnector {
    /// `request_timeout` bounds every request except wait.
    pub fn new(request_timeout: Option<Duration>) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl EngineConnector for TlsConnector {
    async fn connect(&self, node: &NodeHandle) -> Result<Box<dyn EngineTransport>, TransportError> {
        let transport = TlsEngineTransport::connect(node, self.request_timeout).await?;
        Ok(Box::new(transport))
    }
}

async fn read_pem(path: PathBuf) -> Result<Vec<u8>, TransportError> {
    tokio::fs::read(&path)
        .await
        .map_err(|source| TransportError::Credentials { path, source })
}
