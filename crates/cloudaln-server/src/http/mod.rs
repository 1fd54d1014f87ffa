//! HTTP file server for node workloads.
//!
//! Provides endpoints for:
//! - Reference index files (`/ref`, `/ref.amb`, `/ref.ann`, `/ref.bwt`, `/ref.pac`, `/ref.sa`)
//! - Read shards (`GET /<n>`)
//! - Alignment results (`PUT /<n>`)
//!
//! Every request is gated by HTTP Basic credentials when configured.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

mod auth;
mod handlers;

pub use auth::{hash_secret, verify_header, BasicCredentials, REALM};

/// Reference index extensions served next to the reference itself.
pub const REFERENCE_EXTENSIONS: [&str; 5] = ["amb", "ann", "bwt", "pac", "sa"];

/// Extension appended to a read's path for its uploaded result.
pub const RESULT_EXTENSION: &str = "bam";

/// Files exposed by the server.
#[derive(Debug, Clone)]
pub struct FileServerState {
    reference: PathBuf,
    reads: Vec<PathBuf>,
    credential_digest: Option<String>,
}

impl FileServerState {
    /// Create server state. `credentials` of `None` disables authentication.
    pub fn new(
        reference: impl Into<PathBuf>,
        reads: Vec<PathBuf>,
        credentials: Option<&BasicCredentials>,
    ) -> Arc<Self> {
        Arc::new(Self {
            reference: reference.into(),
            reads,
            credential_digest: credentials.map(BasicCredentials::digest),
        })
    }

    pub fn reads(&self) -> &[PathBuf] {
        &self.reads
    }

    pub(crate) fn credential_digest(&self) -> Option<&str> {
        self.credential_digest.as_deref()
    }

    /// File served for `GET /<name>`.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name == "ref" {
            return Some(self.reference.clone());
        }

        if let Some(ext) = name.strip_prefix("ref.") {
            return REFERENCE_EXTENSIONS
                .contains(&ext)
                .then(|| append_extension(&self.reference, ext));
        }

        parse_shard_index(name).and_then(|index| self.reads.get(index).cloned())
    }

    /// Final result path for shard `index`.
    pub fn result_path(&self, index: usize) -> Option<PathBuf> {
        self.reads
            .get(index)
            .map(|read| append_extension(read, RESULT_EXTENSION))
    }
}

/// Parse a decimal shard index. Signs and other characters are rejected.
pub fn parse_shard_index(name: &str) -> Option<usize> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// `path` with `.ext` appended, keeping any existing extension.
pub(crate) fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_owned();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

/// Create the HTTP router.
pub fn create_router(state: Arc<FileServerState>) -> Router {
    Router::new()
        .route("/:name", get(handlers::get_file).put(handlers::put_file))
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_basic_auth,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: Arc<FileServerState>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
