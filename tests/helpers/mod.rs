#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use mnemo::config::SourceConfig;
use mnemo::embedding::{EmbeddingProvider, EMBEDDING_DIM};
use mnemo::error::Result;
use mnemo::memory::store::{DualStore, StoreScope, VectorStore};
use mnemo::memory::types::SourceKind;

/// Deterministic hash-spike embedding provider. Each whitespace token adds a
/// spike at a hashed position, so identical texts embed identically and
/// unrelated texts land near-orthogonal — similarity behaves like the real
/// model without loading one.
pub struct StubProvider;

impl EmbeddingProvider for StubProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            v[(hasher.finish() as usize) % EMBEDDING_DIM] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }
}

/// Open a dual store pair backed by temp files under `dir`.
pub fn open_dual(dir: &Path) -> DualStore {
    DualStore::open(dir.join("local.db"), dir.join("global.db")).unwrap()
}

/// Open a single local store backed by a temp file under `dir`.
pub fn open_local(dir: &Path) -> VectorStore {
    VectorStore::open(dir.join("local.db"), StoreScope::Local).unwrap()
}

/// A log source config pointing at `path`.
pub fn log_source(path: &Path, soft_limit: usize, keep_recent: usize) -> SourceConfig {
    SourceConfig {
        name: "session-log".into(),
        kind: SourceKind::Session,
        path: path.to_string_lossy().into_owned(),
        collection: "session_log".into(),
        enabled: true,
        soft_limit,
        keep_recent,
        extensions: vec![],
        archive_dir: None,
        pinned_ids: vec![],
    }
}

/// A pool directory source config pointing at `dir`.
pub fn pool_source(dir: &Path, keep_recent: usize) -> SourceConfig {
    SourceConfig {
        name: "pool".into(),
        kind: SourceKind::PoolDoc,
        path: dir.to_string_lossy().into_owned(),
        collection: "pool_docs".into(),
        enabled: true,
        soft_limit: keep_recent + 1000,
        keep_recent,
        extensions: vec!["md".into(), "json".into()],
        archive_dir: None,
        pinned_ids: vec![],
    }
}

/// Write `n` distinct plain-text log lines.
pub fn write_log(path: &Path, n: usize) {
    let mut out = String::new();
    for i in 0..n {
        out.push_str(&format!("session entry number {i} discussing topic {}\n", i % 7));
    }
    std::fs::write(path, out).unwrap();
}

/// Make every insert into a collection's records table fail, simulating an
/// unreachable store. `drop_fault` reverses it.
pub fn poison_collection(store: &VectorStore, collection: &str) {
    store.ensure_collection(collection).unwrap();
    store
        .raw()
        .execute_batch(&format!(
            r#"CREATE TRIGGER poison_{collection}
               BEFORE INSERT ON "records_{collection}"
               BEGIN SELECT RAISE(ABORT, 'injected store fault'); END"#
        ))
        .unwrap();
}

pub fn drop_fault(store: &VectorStore, collection: &str) {
    store
        .raw()
        .execute_batch(&format!("DROP TRIGGER poison_{collection}"))
        .unwrap();
}
