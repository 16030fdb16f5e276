mod helpers;

use helpers::{drop_fault, open_dual, poison_collection, StubProvider};
use mnemo::embedding::EmbeddingProvider;
use mnemo::memory::reconcile::reconcile;
use mnemo::memory::store::{ArchiveSink, UpsertOutcome};
use mnemo::memory::types::{Record, SourceKind};

fn record(id: &str, text: &str) -> Record {
    Record {
        id: id.into(),
        text: text.into(),
        source_kind: SourceKind::Session,
        origin_path: "test".into(),
        created_at: "2026-01-01T00:00:00Z".into(),
        pinned: false,
        superseded_by: None,
        metadata: None,
    }
}

#[test]
fn healthy_upsert_lands_in_both_stores() {
    let dir = tempfile::tempdir().unwrap();
    let mut dual = open_dual(dir.path());
    let rec = record("a", "an ordinary session entry");
    let emb = StubProvider.embed(&rec.text).unwrap();

    let outcome = dual.upsert("session_log", &rec, &emb).unwrap();
    assert_eq!(outcome, UpsertOutcome::Complete);
    assert!(dual.local.contains("session_log", "a").unwrap());
    assert!(dual.global.contains("session_log", "a").unwrap());
    assert_eq!(dual.local.pending_sync_count().unwrap(), 0);
}

#[test]
fn global_failure_after_local_success_is_partial_and_queued() {
    let dir = tempfile::tempdir().unwrap();
    let mut dual = open_dual(dir.path());
    poison_collection(&dual.global, "session_log");

    let rec = record("a", "entry written while the global store is down");
    let emb = StubProvider.embed(&rec.text).unwrap();
    let outcome = dual.upsert("session_log", &rec, &emb).unwrap();

    assert!(matches!(outcome, UpsertOutcome::Partial { .. }));
    assert!(dual.local.contains("session_log", "a").unwrap());
    assert!(!dual.global.contains("session_log", "a").unwrap());
    assert_eq!(dual.local.pending_sync_count().unwrap(), 1);
}

#[test]
fn reconcile_replays_queued_writes_once_global_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let mut dual = open_dual(dir.path());
    poison_collection(&dual.global, "session_log");

    for i in 0..3 {
        let rec = record(&format!("r{i}"), &format!("queued entry number {i}"));
        let emb = StubProvider.embed(&rec.text).unwrap();
        dual.upsert("session_log", &rec, &emb).unwrap();
    }
    assert_eq!(dual.local.pending_sync_count().unwrap(), 3);

    // Still down: replay fails, nothing is lost from the queue.
    let report = reconcile(&mut dual).unwrap();
    assert_eq!(report.replayed, 0);
    assert_eq!(report.failed, 3);
    assert_eq!(dual.local.pending_sync_count().unwrap(), 3);

    drop_fault(&dual.global, "session_log");
    let report = reconcile(&mut dual).unwrap();
    assert_eq!(report.replayed, 3);
    assert_eq!(dual.local.pending_sync_count().unwrap(), 0);
    assert_eq!(dual.global.count("session_log").unwrap(), 3);
}

#[test]
fn newer_global_copy_wins_during_reconcile() {
    let dir = tempfile::tempdir().unwrap();
    let mut dual = open_dual(dir.path());

    // A stale local copy is queued while the global store already holds a
    // strictly newer version of the same record.
    let stale = record("a", "stale local copy");
    let emb = StubProvider.embed(&stale.text).unwrap();
    dual.local.upsert("session_log", &stale, &emb).unwrap();
    dual.local
        .queue_pending_sync("session_log", "a", "test")
        .unwrap();

    let mut newer = record("a", "newer global copy");
    newer.created_at = "2026-02-01T00:00:00Z".into();
    let newer_emb = StubProvider.embed(&newer.text).unwrap();
    dual.global.upsert("session_log", &newer, &newer_emb).unwrap();

    let report = reconcile(&mut dual).unwrap();
    assert_eq!(report.dropped, 1);
    assert_eq!(report.replayed, 0);
    let kept = dual.global.get("session_log", "a").unwrap().unwrap();
    assert_eq!(kept.text, "newer global copy");
}

#[test]
fn last_write_wins_compares_instants_across_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let mut dual = open_dual(dir.path());

    // The local stamp sorts after the global one as a string, but +05:00 at
    // 05:00 is midnight UTC — two hours older than the global copy.
    let mut stale = record("a", "older local copy");
    stale.created_at = "2026-01-10T05:00:00+05:00".into();
    let emb = StubProvider.embed(&stale.text).unwrap();
    dual.local.upsert("session_log", &stale, &emb).unwrap();
    dual.local
        .queue_pending_sync("session_log", "a", "test")
        .unwrap();

    let mut newer = record("a", "newer global copy");
    newer.created_at = "2026-01-10T02:00:00+00:00".into();
    let newer_emb = StubProvider.embed(&newer.text).unwrap();
    dual.global.upsert("session_log", &newer, &newer_emb).unwrap();

    let report = reconcile(&mut dual).unwrap();
    assert_eq!(report.dropped, 1);
    assert_eq!(report.replayed, 0);
    let kept = dual.global.get("session_log", "a").unwrap().unwrap();
    assert_eq!(kept.text, "newer global copy");
}
