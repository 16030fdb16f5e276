//! Long-horizon memory archival and retrieval engine for agent workspaces.
//!
//! mnemo watches a set of size-bounded sources (rolling session logs, pool
//! document directories, closed plan exports), archives their overflow into
//! vector-searchable collections, and retrieves it back by semantic
//! similarity — either on explicit query or associatively, when live
//! interaction text resembles a stored fragment.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec)
//!   for vector search, dual-written to a workspace-local and a shared global
//!   store with a reconciliation queue between them
//! - **Embeddings**: Local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions)
//! - **Retention**: Archive-before-truncate rollover — a source is only ever
//!   truncated after every evicted record is confirmed in the store
//! - **Surfacing**: Five-dimension fragment signatures matched against live
//!   text with a weighted similarity, gated per session
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from JSON files and environment variables
//! - [`db`] — SQLite database initialization, schema, and migrations
//! - [`embedding`] — Text-to-vector embedding pipeline via ONNX Runtime
//! - [`error`] — The crate-wide error type
//! - [`memory`] — Core engine: normalize, store, rollover, intake, search, surface

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod memory;
