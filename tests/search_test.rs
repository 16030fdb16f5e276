mod helpers;

use helpers::{open_local, StubProvider};
use mnemo::embedding::EmbeddingProvider;
use mnemo::memory::search::{search, SearchScope};
use mnemo::memory::types::{Record, SourceKind};

fn record(id: &str, text: &str, kind: SourceKind) -> Record {
    Record {
        id: id.into(),
        text: text.into(),
        source_kind: kind,
        origin_path: "test".into(),
        created_at: "2026-01-01T00:00:00Z".into(),
        pinned: false,
        superseded_by: None,
        metadata: None,
    }
}

fn put(store: &mut mnemo::memory::store::VectorStore, collection: &str, rec: &Record) {
    let emb = StubProvider.embed(&rec.text).unwrap();
    store.upsert(collection, rec, &emb).unwrap();
}

#[test]
fn results_merge_and_rerank_across_collections() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open_local(dir.path());
    put(
        &mut store,
        "session_log",
        &record("a", "debugging the sqlite vacuum scheduler", SourceKind::Session),
    );
    put(
        &mut store,
        "pool_docs",
        &record("b", "sqlite vacuum scheduler design notes", SourceKind::PoolDoc),
    );
    put(
        &mut store,
        "plans",
        &record("c", "quarterly gardening newsletter plan", SourceKind::Plan),
    );

    let hits = search(
        &store,
        &StubProvider,
        "sqlite vacuum scheduler design notes",
        &SearchScope::All,
        10,
        0.40,
    )
    .unwrap();

    // Best match first, regardless of which collection holds it.
    assert_eq!(hits[0].record.id, "b");
    assert_eq!(hits[0].collection, "pool_docs");
    assert!(hits[0].similarity > 0.99);
    assert!(hits.iter().all(|h| h.record.id != "c"));
}

#[test]
fn nothing_above_the_floor_is_empty_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open_local(dir.path());
    put(
        &mut store,
        "pool_docs",
        &record("a", "bounded channel backpressure notes", SourceKind::PoolDoc),
    );

    let hits = search(
        &store,
        &StubProvider,
        "medieval falconry techniques",
        &SearchScope::All,
        10,
        0.40,
    )
    .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn unknown_collection_in_scope_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_local(dir.path());
    let hits = search(
        &store,
        &StubProvider,
        "anything",
        &SearchScope::One("never_created".into()),
        10,
        0.40,
    )
    .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn reupserting_a_record_does_not_duplicate_it() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open_local(dir.path());
    let rec = record("a", "first version of the note", SourceKind::PoolDoc);
    put(&mut store, "pool_docs", &rec);
    let updated = record("a", "second version of the note", SourceKind::PoolDoc);
    put(&mut store, "pool_docs", &updated);

    assert_eq!(store.count("pool_docs").unwrap(), 1);
    let hits = search(
        &store,
        &StubProvider,
        "second version of the note",
        &SearchScope::One("pool_docs".into()),
        5,
        0.40,
    )
    .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.text, "second version of the note");
}

#[test]
fn superseded_records_are_excluded_from_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open_local(dir.path());
    put(
        &mut store,
        "pool_docs",
        &record("old", "retention policy for session logs", SourceKind::PoolDoc),
    );
    put(
        &mut store,
        "pool_docs",
        &record("new", "retention policy for session logs revised", SourceKind::PoolDoc),
    );
    store.supersede("pool_docs", "old", "new").unwrap();

    let hits = search(
        &store,
        &StubProvider,
        "retention policy for session logs",
        &SearchScope::One("pool_docs".into()),
        5,
        0.40,
    )
    .unwrap();
    assert!(hits.iter().all(|h| h.record.id != "old"));
    assert!(hits.iter().any(|h| h.record.id == "new"));
}
