//! Core types for RelayDoc

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Name of a shared document
///
/// One document name maps to exactly one broadcast channel and one
/// persisted row, so it must be unique within the channel namespace
/// and the store partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocName(String);

impl DocName {
    /// Create a document name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for DocName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replica identity for one sync engine instance
///
/// Generated once per engine and carried on every outbound message so a
/// replica can recognize and discard its own echoes. Process-lifetime
/// scoped; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Generate a new random peer identity
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        Self(bs58::encode(&bytes).into_string())
    }

    /// Get the identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer_{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_unique() {
        let a = PeerId::generate();
        let b = PeerId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_peer_id_display() {
        let id = PeerId::generate();
        assert!(format!("{}", id).starts_with("peer_"));
    }

    #[test]
    fn test_doc_name_from_str() {
        let name = DocName::from("notes");
        assert_eq!(name.as_str(), "notes");
        assert_eq!(format!("{}", name), "notes");
    }
}
