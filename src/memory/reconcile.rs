//! Dual-write reconciliation job.
//!
//! Replays records queued in `sync_pending` (local writes whose global write
//! failed) into the global store. Runs at the start of every intake sweep.
//! Conflict rule: last-write-wins by `created_at` — a pending local record
//! overwrites the global copy unless the global copy is strictly newer, in
//! which case the pending entry is dropped. Idempotent: an empty queue is a
//! no-op, and a failed replay stays queued for the next sweep.

use chrono::DateTime;
use serde::Serialize;

use crate::error::Result;
use crate::memory::store::DualStore;

#[derive(Debug, Default, Serialize)]
pub struct ReconcileReport {
    /// Pending records successfully replayed into the global store.
    pub replayed: usize,
    /// Pending entries dropped because the global copy was newer.
    pub dropped: usize,
    /// Replays that failed again and remain queued.
    pub failed: usize,
}

pub fn reconcile(dual: &mut DualStore) -> Result<ReconcileReport> {
    let pending = dual.local.pending_sync()?;
    let mut report = ReconcileReport::default();

    for (collection, id) in pending {
        let Some(record) = dual.local.get(&collection, &id)? else {
            // Record vanished locally; nothing to replay.
            dual.local.clear_pending_sync(&collection, &id)?;
            report.dropped += 1;
            continue;
        };
        let Some(embedding) = dual.local.get_embedding(&collection, &id)? else {
            dual.local.clear_pending_sync(&collection, &id)?;
            report.dropped += 1;
            continue;
        };

        // Last-write-wins by created_at.
        if let Some(global_copy) = dual.global.get(&collection, &id)? {
            if strictly_newer(&global_copy.created_at, &record.created_at) {
                dual.local.clear_pending_sync(&collection, &id)?;
                report.dropped += 1;
                continue;
            }
        }

        match dual.global.upsert(&collection, &record, &embedding) {
            Ok(()) => {
                dual.local.clear_pending_sync(&collection, &id)?;
                report.replayed += 1;
            }
            Err(e) => {
                tracing::warn!(collection, id, error = %e, "reconciliation replay failed");
                report.failed += 1;
            }
        }
    }

    if report.replayed + report.dropped + report.failed > 0 {
        tracing::info!(
            replayed = report.replayed,
            dropped = report.dropped,
            failed = report.failed,
            "reconciliation pass finished"
        );
    }
    Ok(report)
}

/// True when `candidate` is a strictly later instant than `other`.
///
/// `created_at` stamps pass through normalization verbatim, so they can carry
/// any RFC 3339 offset; comparing the raw strings would rank `05:00:00+05:00`
/// above `02:00:00+00:00` even though it is three hours older. Unparseable
/// stamps fall back to lexicographic order, which matches the common all-UTC
/// case.
fn strictly_newer(candidate: &str, other: &str) -> bool {
    match (
        DateTime::parse_from_rfc3339(candidate),
        DateTime::parse_from_rfc3339(other),
    ) {
        (Ok(a), Ok(b)) => a > b,
        _ => candidate > other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EMBEDDING_DIM;
    use crate::memory::store::{ArchiveSink, StoreScope, UpsertOutcome, VectorStore};
    use crate::memory::types::{Record, SourceKind};

    fn record(id: &str, text: &str, created_at: &str) -> Record {
        Record {
            id: id.into(),
            text: text.into(),
            source_kind: SourceKind::Session,
            origin_path: "logs".into(),
            created_at: created_at.into(),
            pinned: false,
            superseded_by: None,
            metadata: None,
        }
    }

    fn embedding(seed: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[seed % EMBEDDING_DIM] = 1.0;
        v
    }

    fn dual() -> DualStore {
        DualStore {
            local: VectorStore::open_in_memory(StoreScope::Local).unwrap(),
            global: VectorStore::open_in_memory(StoreScope::Global).unwrap(),
        }
    }

    #[test]
    fn empty_queue_is_noop() {
        let mut d = dual();
        let report = reconcile(&mut d).unwrap();
        assert_eq!(report.replayed, 0);
        assert_eq!(report.dropped, 0);
    }

    #[test]
    fn replays_pending_into_global() {
        let mut d = dual();
        let r = record("a", "catch me up", "2026-03-01T00:00:00Z");
        d.local.upsert("logs", &r, &embedding(0)).unwrap();
        d.local.queue_pending_sync("logs", "a", "global was down").unwrap();

        let report = reconcile(&mut d).unwrap();
        assert_eq!(report.replayed, 1);
        assert!(d.global.contains("logs", "a").unwrap());
        assert_eq!(d.local.pending_sync_count().unwrap(), 0);
    }

    #[test]
    fn newer_global_copy_wins() {
        let mut d = dual();
        let stale = record("a", "stale local", "2026-03-01T00:00:00Z");
        let fresh = record("a", "fresh global", "2026-03-02T00:00:00Z");
        d.local.upsert("logs", &stale, &embedding(0)).unwrap();
        d.global.upsert("logs", &fresh, &embedding(1)).unwrap();
        d.local.queue_pending_sync("logs", "a", "conflict").unwrap();

        let report = reconcile(&mut d).unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(report.replayed, 0);
        assert_eq!(
            d.global.get("logs", "a").unwrap().unwrap().text,
            "fresh global"
        );
        assert_eq!(d.local.pending_sync_count().unwrap(), 0);
    }

    #[test]
    fn newer_is_judged_by_instant_not_string_order() {
        // +05:00 at 05:00 is 00:00Z — older than 02:00Z despite sorting after it.
        assert!(strictly_newer(
            "2026-01-10T02:00:00+00:00",
            "2026-01-10T05:00:00+05:00"
        ));
        assert!(!strictly_newer(
            "2026-01-10T05:00:00+05:00",
            "2026-01-10T02:00:00+00:00"
        ));
        // Equal instants in different offsets are not strictly newer either way.
        assert!(!strictly_newer(
            "2026-01-10T00:00:00Z",
            "2026-01-10T05:00:00+05:00"
        ));
        // Unparseable stamps fall back to string order.
        assert!(strictly_newer("b", "a"));
    }

    #[test]
    fn reconcile_after_partial_write_catches_up() {
        let mut d = dual();
        // Poison global, produce a partial write.
        d.global.ensure_collection("logs").unwrap();
        d.global
            .raw()
            .execute_batch(
                r#"CREATE TRIGGER fail_logs BEFORE INSERT ON "records_logs"
                   BEGIN SELECT RAISE(ABORT, 'injected'); END;"#,
            )
            .unwrap();
        let r = record("a", "partial", "2026-03-01T00:00:00Z");
        let outcome = d.upsert("logs", &r, &embedding(0)).unwrap();
        assert!(matches!(outcome, UpsertOutcome::Partial { .. }));

        // First reconcile fails again, entry stays queued.
        let report = reconcile(&mut d).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(d.local.pending_sync_count().unwrap(), 1);

        // Fault clears; second reconcile catches up.
        d.global.raw().execute_batch("DROP TRIGGER fail_logs").unwrap();
        let report = reconcile(&mut d).unwrap();
        assert_eq!(report.replayed, 1);
        assert!(d.global.contains("logs", "a").unwrap());
    }
}
