//! The crate-wide error type.
//!
//! Errors split into two classes: per-record errors (a malformed line, one
//! failed upsert) that sweep loops collect and continue past, and fatal ones
//! (lock contention, an unavailable embedding model) that abort the whole
//! operation. [`MemoryError::is_per_record`] is the dividing line.

use std::path::PathBuf;

use crate::memory::types::SourceKind;

pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Input that the normalizer could not map into a record. Named fields
    /// so a monitoring pipeline can say exactly what was missing.
    #[error("schema error in {kind} input: {reason}")]
    Schema { kind: SourceKind, reason: String },

    /// The embedding model failed to load or run. Non-fatal for archival
    /// (the batch defers for retry), fatal for search.
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A store write failed outright (as opposed to the partial, queued
    /// global-side failure, which is not an error).
    #[error("store write failed for '{id}' in collection '{collection}': {reason}")]
    StoreWrite {
        collection: String,
        id: String,
        reason: String,
    },

    /// The source is held by a concurrent rollover or intake operation.
    #[error("source is locked by a concurrent operation: {path}")]
    LockContention { path: PathBuf },

    /// Collection names are interpolated into DDL and restricted accordingly.
    #[error("invalid collection name: '{0}'")]
    InvalidCollection(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Whether a sweep should collect this error and continue with the next
    /// record, rather than abort the whole pass.
    pub fn is_per_record(&self) -> bool {
        matches!(self, Self::Schema { .. } | Self::EmbeddingUnavailable(_))
    }
}
