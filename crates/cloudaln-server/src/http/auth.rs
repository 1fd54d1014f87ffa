//! HTTP Basic credentials for the file server.
//!
//! The server keeps only a SHA-256 digest of `user:password` and compares
//! digests of what clients present.

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};
use tracing::warn;

use cloudaln_core::random_token;

use super::FileServerState;

/// Realm announced in `WWW-Authenticate`.
pub const REALM: &str = "cloud-aln";

/// Length of generated passwords.
const GENERATED_PASSWORD_LEN: usize = 24;

/// A username/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    username: String,
    password: String,
}

impl BasicCredentials {
    /// Create credentials from explicit values.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Create credentials for `username` with a random password.
    pub fn generate(username: impl Into<String>) -> Self {
        Self::new(username, random_token(GENERATED_PASSWORD_LEN))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// `user:password`, as sent by clients.
    pub fn user_pass(&self) -> String {
        format!("{}:{}", self.username, self.password)
    }

    /// Value of an `Authorization` header carrying these credentials.
    pub fn header_value(&self) -> String {
        format!("Basic {}", STANDARD.encode(self.user_pass()))
    }

    /// Digest the server stores.
    pub fn digest(&self) -> String {
        hash_secret(&self.user_pass())
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Hash a secret using SHA-256.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check an `Authorization` header value against an expected digest.
pub fn verify_header(header: &str, expected_digest: &str) -> bool {
    let Some((scheme, encoded)) = header.trim().split_once(' ') else {
        return false;
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        return false;
    }

    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(user_pass) = String::from_utf8(decoded) else {
        return false;
    };

    hash_secret(&user_pass) == expected_digest
}

/// Reject requests without valid credentials when the server requires them.
pub async fn require_basic_auth(
    State(state): State<Arc<FileServerState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = state.credential_digest() {
        let authorized = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| verify_header(value, expected))
            .unwrap_or(false);

        if !authorized {
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                "Rejected request with missing or invalid credentials"
            );
            return (
                StatusCode::UNAUTHORIZED,
                [(WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", REALM))],
            )
                .into_response();
        }
    }

    next.run(request).await
}
