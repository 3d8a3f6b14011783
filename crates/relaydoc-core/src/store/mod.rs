//! Durable persistence for shared documents
//!
//! Makes one document's state outlive any single process, with bounded
//! write amplification: the full merged snapshot is written to a single
//! row keyed by document name (last write wins), never a delta log, so
//! storage stays O(1) rows per document regardless of edit count.
//!
//! The row store itself is an opaque, eventually-consistent tabular
//! service reachable through [`SnapshotStore`]; this module only decides
//! *when* to read and write it.

pub mod adapter;

use async_trait::async_trait;

use crate::error::SyncResult;

pub use adapter::{StoreAdapter, StoreOptions};

/// Location of the snapshot rows within the tabular store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Schema the table lives in
    pub schema: String,
    /// Table holding one row per document
    pub table: String,
    /// Column holding the document name (unique key)
    pub key_column: String,
    /// Column holding the base64-encoded document snapshot
    pub state_column: String,
}

impl Default for TableSpec {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            table: "documents".to_string(),
            key_column: "name".to_string(),
            state_column: "state".to_string(),
        }
    }
}

/// Persistent row store seam
///
/// One row per document: the key column holds the document name, the
/// state column holds the base64-encoded full snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Fetch the snapshot cell for `key`
    ///
    /// `Ok(None)` is the well-defined not-found condition (cold start),
    /// not an error.
    async fn fetch(&self, table: &TableSpec, key: &str) -> SyncResult<Option<String>>;

    /// Insert or fully replace the row for `key`
    async fn upsert(&self, table: &TableSpec, key: &str, state: &str) -> SyncResult<()>;

    /// Delete the row for `key`
    async fn delete(&self, table: &TableSpec, key: &str) -> SyncResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_spec_defaults() {
        let spec = TableSpec::default();
        assert_eq!(spec.schema, "public");
        assert_eq!(spec.table, "documents");
        assert_eq!(spec.key_column, "name");
        assert_eq!(spec.state_column, "state");
    }
}
