//! Newtype wrapper for node identities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::token::random_token;

/// Prefix shared by every node this tool provisions.
pub const NODE_NAME_PREFIX: &str = "cloud-aln-";

/// Unique identifier for a provisioned Node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new NodeId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random NodeId.
    ///
    /// Cloud drivers reject upper-case instance names, so the token is
    /// lowercased.
    pub fn generate() -> Self {
        Self(format!("{}{}", NODE_NAME_PREFIX, random_token(16).to_lowercase()))
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_generate() {
        let id1 = NodeId::generate();
        let id2 = NodeId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_generated_id_is_prefixed_and_lowercase() {
        let id = NodeId::generate();
        assert!(id.as_str().starts_with(NODE_NAME_PREFIX));
        assert_eq!(id.as_str().len(), NODE_NAME_PREFIX.len() + 16);
        assert_eq!(id.as_str(), id.as_str().to_lowercase());
    }

    #[test]
    fn test_id_display() {
        let id = NodeId::new("cloud-aln-test");
        assert_eq!(format!("{}", id), "cloud-aln-test");
    }
}
