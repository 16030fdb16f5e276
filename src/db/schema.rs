//! SQL DDL for the store's fixed tables.
//!
//! Defines the `collections` registry, `sync_pending` (dual-write
//! reconciliation queue), `surface_state` (per-session surfacing gates), and
//! `schema_meta` tables. Per-collection record/vector tables are created on
//! demand by the store (see `memory::store::ensure_collection`). All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// Fixed schema DDL. Collection tables are dynamic and created separately.
const SCHEMA_SQL: &str = r#"
-- Registry of logical collections. Each has exactly one dimensionality and
-- distance metric; all vectors within it are comparable.
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    dimensions INTEGER NOT NULL,
    metric TEXT NOT NULL DEFAULT 'cosine',
    schema_version INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Records written locally whose global-store write failed. Replayed by the
-- reconciliation job at the start of every intake sweep.
CREATE TABLE IF NOT EXISTS sync_pending (
    collection TEXT NOT NULL,
    record_id TEXT NOT NULL,
    queued_at TEXT NOT NULL,
    reason TEXT,
    PRIMARY KEY (collection, record_id)
);

-- Per-session gate state for the associative surfacing engine.
CREATE TABLE IF NOT EXISTS surface_state (
    session_id TEXT PRIMARY KEY,
    surfaced_count INTEGER NOT NULL DEFAULT 0,
    last_surfaced_at TEXT,
    last_turn INTEGER NOT NULL DEFAULT 0
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all fixed tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"collections".to_string()));
        assert!(tables.contains(&"sync_pending".to_string()));
        assert!(tables.contains(&"surface_state".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));

        // Verify the vec extension is loaded
        let version: String = conn
            .query_row("SELECT vec_version()", [], |r| r.get(0))
            .unwrap();
        assert!(!version.is_empty());
    }

    #[test]
    fn schema_is_idempotent() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }
}
