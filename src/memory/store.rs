//! Vector store — durable `(id, vector, text, metadata)` tuples in named
//! collections, plus the dual-write pair.
//!
//! [`VectorStore`] wraps one sqlite database with a `records_<name>` table and
//! a vec0 `vec_<name>` virtual table per collection. [`DualStore`] mirrors
//! every upsert to a local-scope and a global-scope store; a global failure
//! after a local success is reported as a partial write and queued in
//! `sync_pending` rather than rolled back — local availability takes
//! precedence over global consistency.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::db;
use crate::embedding::EMBEDDING_DIM;
use crate::error::{MemoryError, Result};
use crate::memory::types::Record;
use crate::memory::{embedding_to_bytes, l2_to_cosine};

/// Which half of the dual-write pair a store is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    /// Workspace-scoped store, the fast path for search.
    Local,
    /// Shared system of record, catch-up target for reconciliation.
    Global,
}

impl StoreScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Global => "global",
        }
    }
}

/// Outcome of a dual-write upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Both stores accepted the write.
    Complete,
    /// Local write succeeded, global write failed and was queued for
    /// reconciliation.
    Partial { reason: String },
}

/// Sink that archival drives records into. The dual store is the production
/// implementation; tests substitute failure-injecting doubles.
pub trait ArchiveSink {
    fn contains(&self, collection: &str, id: &str) -> Result<bool>;
    fn upsert(&mut self, collection: &str, record: &Record, embedding: &[f32])
        -> Result<UpsertOutcome>;
}

/// One physical sqlite database holding any number of collections.
pub struct VectorStore {
    conn: Connection,
    scope: StoreScope,
}

impl VectorStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: impl AsRef<Path>, scope: StoreScope) -> anyhow::Result<Self> {
        let conn = db::open_database(path)?;
        Ok(Self { conn, scope })
    }

    #[cfg(test)]
    pub fn open_in_memory(scope: StoreScope) -> anyhow::Result<Self> {
        let conn = db::open_memory_database()?;
        Ok(Self { conn, scope })
    }

    pub fn scope(&self) -> StoreScope {
        self.scope
    }

    /// Create the record + vector tables for a collection if missing and
    /// register it. Idempotent.
    pub fn ensure_collection(&self, name: &str) -> Result<()> {
        validate_collection_name(name)?;

        let records_ddl = format!(
            r#"CREATE TABLE IF NOT EXISTS "records_{name}" (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                source_kind TEXT NOT NULL
                    CHECK(source_kind IN ('session','pool_doc','plan','code_symbol','fragment')),
                origin_path TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                pinned INTEGER NOT NULL DEFAULT 0,
                superseded_by TEXT,
                metadata TEXT
            )"#
        );
        self.conn.execute(&records_ddl, [])?;

        // vec0 virtual table must be created separately (sqlite-vec syntax).
        let vec_ddl = format!(
            r#"CREATE VIRTUAL TABLE IF NOT EXISTS "vec_{name}" USING vec0(
                id TEXT PRIMARY KEY,
                embedding FLOAT[{EMBEDDING_DIM}]
            )"#
        );
        self.conn.execute(&vec_ddl, [])?;

        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR IGNORE INTO collections (name, dimensions, metric, schema_version, created_at) \
             VALUES (?1, ?2, 'cosine', ?3, ?4)",
            params![
                name,
                EMBEDDING_DIM as i64,
                db::migrations::CURRENT_SCHEMA_VERSION,
                now
            ],
        )?;

        Ok(())
    }

    /// Names of all registered collections.
    pub fn collections(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM collections ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Insert or replace a record and its vector. Same id never duplicates —
    /// the old vector row is removed first, so collection cardinality is
    /// unchanged on re-archival.
    pub fn upsert(&mut self, collection: &str, record: &Record, embedding: &[f32]) -> Result<()> {
        self.ensure_collection(collection)?;
        self.upsert_inner(collection, record, embedding)
            .map_err(|e| MemoryError::StoreWrite {
                collection: collection.to_string(),
                id: record.id.clone(),
                reason: e.to_string(),
            })
    }

    fn upsert_inner(
        &mut self,
        collection: &str,
        record: &Record,
        embedding: &[f32],
    ) -> rusqlite::Result<()> {
        let tx = self.conn.transaction()?;
        let metadata_json = record.metadata.as_ref().map(|m| m.to_string());

        tx.execute(
            &format!(
                r#"INSERT OR REPLACE INTO "records_{collection}"
                   (id, text, source_kind, origin_path, created_at, pinned, superseded_by, metadata)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#
            ),
            params![
                record.id,
                record.text,
                record.source_kind.as_str(),
                record.origin_path,
                record.created_at,
                record.pinned as i64,
                record.superseded_by,
                metadata_json,
            ],
        )?;

        // vec0 has no OR REPLACE; delete-then-insert keeps upsert semantics.
        tx.execute(
            &format!(r#"DELETE FROM "vec_{collection}" WHERE id = ?1"#),
            params![record.id],
        )?;
        tx.execute(
            &format!(r#"INSERT INTO "vec_{collection}" (id, embedding) VALUES (?1, ?2)"#),
            params![record.id, embedding_to_bytes(embedding)],
        )?;

        tx.commit()
    }

    /// Delete a record and its vector.
    pub fn delete(&mut self, collection: &str, id: &str) -> Result<()> {
        validate_collection_name(collection)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            &format!(r#"DELETE FROM "records_{collection}" WHERE id = ?1"#),
            params![id],
        )?;
        tx.execute(
            &format!(r#"DELETE FROM "vec_{collection}" WHERE id = ?1"#),
            params![id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Check whether a record id exists in a collection.
    pub fn contains(&self, collection: &str, id: &str) -> Result<bool> {
        validate_collection_name(collection)?;
        if !self.has_collection_table(collection)? {
            return Ok(false);
        }
        let found: i64 = self.conn.query_row(
            &format!(r#"SELECT COUNT(*) FROM "records_{collection}" WHERE id = ?1"#),
            params![id],
            |row| row.get(0),
        )?;
        Ok(found > 0)
    }

    /// Fetch a record by id.
    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        validate_collection_name(collection)?;
        if !self.has_collection_table(collection)? {
            return Ok(None);
        }
        let record = self
            .conn
            .query_row(
                &format!(
                    r#"SELECT id, text, source_kind, origin_path, created_at, pinned,
                       superseded_by, metadata FROM "records_{collection}" WHERE id = ?1"#
                ),
                params![id],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Fetch a record's embedding by id.
    pub fn get_embedding(&self, collection: &str, id: &str) -> Result<Option<Vec<f32>>> {
        validate_collection_name(collection)?;
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                &format!(r#"SELECT embedding FROM "vec_{collection}" WHERE id = ?1"#),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bytes.map(|b| crate::memory::bytes_to_embedding(&b)))
    }

    /// Number of records in a collection.
    pub fn count(&self, collection: &str) -> Result<usize> {
        validate_collection_name(collection)?;
        if !self.has_collection_table(collection)? {
            return Ok(0);
        }
        let count: i64 = self.conn.query_row(
            &format!(r#"SELECT COUNT(*) FROM "records_{collection}""#),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// All records in a collection, oldest first.
    pub fn list(&self, collection: &str) -> Result<Vec<Record>> {
        validate_collection_name(collection)?;
        if !self.has_collection_table(collection)? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(&format!(
            r#"SELECT id, text, source_kind, origin_path, created_at, pinned,
               superseded_by, metadata FROM "records_{collection}" ORDER BY created_at, id"#
        ))?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Nearest-neighbor query. Returns `(record, cosine_similarity)` ranked
    /// best-first, floored at `min_similarity`, superseded records skipped.
    /// An empty result is a valid, expected outcome.
    pub fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        min_similarity: f64,
    ) -> Result<Vec<(Record, f64)>> {
        validate_collection_name(collection)?;
        if !self.has_collection_table(collection)? {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            r#"SELECT id, distance FROM "vec_{collection}"
               WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2"#
        ))?;
        // Over-fetch so superseded rows don't starve the result set; if a
        // pass exhausts its candidates before reaching k with more rows left
        // in the collection, retry with a doubled limit.
        let total = self.count(collection)?;
        let mut limit = (k * 3).max(k);
        loop {
            let neighbors: Vec<(String, f64)> = stmt
                .query_map(params![embedding_to_bytes(embedding), limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let fetched = neighbors.len();
            let mut floored = false;
            let mut results = Vec::new();
            for (id, distance) in neighbors {
                let similarity = l2_to_cosine(distance);
                // Ordered by distance, so everything past the floor is too.
                if similarity < min_similarity {
                    floored = true;
                    break;
                }
                if let Some(record) = self.get(collection, &id)? {
                    if record.superseded_by.is_some() {
                        continue;
                    }
                    results.push((record, similarity));
                }
                if results.len() >= k {
                    break;
                }
            }

            if results.len() >= k || floored || fetched < limit || limit >= total {
                return Ok(results);
            }
            limit = (limit * 2).min(total);
        }
    }

    /// Mark an old record as superseded by a new one.
    pub fn supersede(&self, collection: &str, old_id: &str, new_id: &str) -> Result<()> {
        validate_collection_name(collection)?;
        let rows = self.conn.execute(
            &format!(r#"UPDATE "records_{collection}" SET superseded_by = ?1 WHERE id = ?2"#),
            params![new_id, old_id],
        )?;
        if rows == 0 {
            return Err(MemoryError::StoreWrite {
                collection: collection.to_string(),
                id: old_id.to_string(),
                reason: "supersede target not found".into(),
            });
        }
        Ok(())
    }

    /// Number of queued partial writes awaiting reconciliation.
    pub fn pending_sync_count(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM sync_pending", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Queue a record whose global write failed.
    pub fn queue_pending_sync(&self, collection: &str, id: &str, reason: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_pending (collection, record_id, queued_at, reason) \
             VALUES (?1, ?2, ?3, ?4)",
            params![collection, id, now, reason],
        )?;
        Ok(())
    }

    /// All queued `(collection, record_id)` pairs, oldest first.
    pub fn pending_sync(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT collection, record_id FROM sync_pending ORDER BY queued_at")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Remove a queue entry after successful replay (or drop).
    pub fn clear_pending_sync(&self, collection: &str, id: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM sync_pending WHERE collection = ?1 AND record_id = ?2",
            params![collection, id],
        )?;
        Ok(())
    }

    /// Shared access for the surfacing gate state and stats queries.
    pub fn raw(&self) -> &Connection {
        &self.conn
    }

    fn has_collection_table(&self, collection: &str) -> Result<bool> {
        let found: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?1",
            params![format!("records_{collection}")],
            |row| row.get(0),
        )?;
        Ok(found > 0)
    }
}

/// The dual-write pair: every upsert goes to both stores. Local failure
/// aborts; global failure after local success is queued and reported as a
/// partial write, by design.
pub struct DualStore {
    pub local: VectorStore,
    pub global: VectorStore,
}

impl DualStore {
    pub fn open(local_path: impl AsRef<Path>, global_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self {
            local: VectorStore::open(local_path, StoreScope::Local)?,
            global: VectorStore::open(global_path, StoreScope::Global)?,
        })
    }
}

impl ArchiveSink for DualStore {
    fn contains(&self, collection: &str, id: &str) -> Result<bool> {
        self.local.contains(collection, id)
    }

    fn upsert(
        &mut self,
        collection: &str,
        record: &Record,
        embedding: &[f32],
    ) -> Result<UpsertOutcome> {
        // Local write first; its failure aborts the operation.
        self.local.upsert(collection, record, embedding)?;

        match self.global.upsert(collection, record, embedding) {
            Ok(()) => Ok(UpsertOutcome::Complete),
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(
                    collection,
                    id = %record.id,
                    error = %reason,
                    "global store write failed, queued for reconciliation"
                );
                self.local.queue_pending_sync(collection, &record.id, &reason)?;
                Ok(UpsertOutcome::Partial { reason })
            }
        }
    }
}

/// Collection names are interpolated into DDL, so they are restricted to
/// lowercase alphanumerics, `_`, and `-`.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(MemoryError::InvalidCollection(name.to_string()))
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    let kind_str: String = row.get(2)?;
    let metadata_str: Option<String> = row.get(7)?;
    Ok(Record {
        id: row.get(0)?,
        text: row.get(1)?,
        source_kind: kind_str.parse().unwrap_or(crate::memory::types::SourceKind::Session),
        origin_path: row.get(3)?,
        created_at: row.get(4)?,
        pinned: row.get::<_, i64>(5)? != 0,
        superseded_by: row.get(6)?,
        metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
    })
}
