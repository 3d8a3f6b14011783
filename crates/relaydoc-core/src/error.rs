//! Error types for RelayDoc

use thiserror::Error;

/// Main error type for RelayDoc operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Error on the broadcast channel (join, send, or transport fault)
    #[error("Channel error: {0}")]
    Channel(String),

    /// Malformed base64 or otherwise corrupt wire data
    #[error("Codec error: {0}")]
    Codec(String),

    /// Automerge document error (corrupt delta, failed transaction)
    #[error("Document error: {0}")]
    Document(String),

    /// Error during persistent store operations (fetch, upsert, delete)
    #[error("Store error: {0}")]
    Store(String),

    /// Error during serialization/deserialization of wire payloads
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<base64::DecodeError> for SyncError {
    fn from(e: base64::DecodeError) -> Self {
        SyncError::Codec(e.to_string())
    }
}

impl From<automerge::AutomergeError> for SyncError {
    fn from(e: automerge::AutomergeError) -> Self {
        SyncError::Document(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<postcard::Error> for SyncError {
    fn from(e: postcard::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type alias using SyncError
pub type SyncResult<T> = Result<T, SyncError>;
