//! Search service — free-text similarity search over one or more collections.
//!
//! The query is embedded once, fanned out to the requested collections,
//! merged and re-ranked by cosine similarity, floored at the minimum
//! similarity, and truncated to `n`. An empty result set is a valid,
//! expected outcome — "no relevant memory" is not an error.

use serde::Serialize;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::memory::store::VectorStore;
use crate::memory::types::Record;

/// Which collections a search fans out to.
#[derive(Debug, Clone)]
pub enum SearchScope {
    /// Every registered collection.
    All,
    /// A single named collection.
    One(String),
    /// An explicit set of collections.
    Set(Vec<String>),
}

impl SearchScope {
    /// Resolve to concrete collection names against the store's registry.
    /// Unknown names resolve to nothing rather than erroring — an absent
    /// collection simply has no memory to offer.
    pub fn resolve(&self, store: &VectorStore) -> Result<Vec<String>> {
        let registered = store.collections()?;
        Ok(match self {
            Self::All => registered,
            Self::One(name) => registered.into_iter().filter(|c| c == name).collect(),
            Self::Set(names) => registered
                .into_iter()
                .filter(|c| names.contains(c))
                .collect(),
        })
    }
}

/// A ranked hit with provenance metadata.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub collection: String,
    pub similarity: f64,
    #[serde(flatten)]
    pub record: Record,
}

/// Embed the query once and run it against every collection in scope.
pub fn search(
    store: &VectorStore,
    provider: &dyn EmbeddingProvider,
    query: &str,
    scope: &SearchScope,
    n: usize,
    min_similarity: f64,
) -> Result<Vec<SearchHit>> {
    let query_embedding = provider.embed(query)?;
    search_with_embedding(store, &query_embedding, scope, n, min_similarity)
}

/// Fan a pre-computed query vector out to the collections in scope.
pub fn search_with_embedding(
    store: &VectorStore,
    query_embedding: &[f32],
    scope: &SearchScope,
    n: usize,
    min_similarity: f64,
) -> Result<Vec<SearchHit>> {
    let collections = scope.resolve(store)?;

    let mut hits: Vec<SearchHit> = Vec::new();
    for collection in &collections {
        for (record, similarity) in store.query(collection, query_embedding, n, min_similarity)? {
            hits.push(SearchHit {
                collection: collection.clone(),
                similarity,
                record,
            });
        }
    }

    // Merge and re-rank across collections, best first. Ties broken by id
    // for a stable ordering.
    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    hits.truncate(n);
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EMBEDDING_DIM;
    use crate::memory::store::StoreScope;
    use crate::memory::types::SourceKind;

    fn test_store() -> VectorStore {
        VectorStore::open_in_memory(StoreScope::Local).unwrap()
    }

    fn record(id: &str, text: &str) -> Record {
        Record {
            id: id.into(),
            text: text.into(),
            source_kind: SourceKind::PoolDoc,
            origin_path: "pool".into(),
            created_at: chrono::Utc::now().to_rfc3339(),
            pinned: false,
            superseded_by: None,
            metadata: None,
        }
    }

    /// Unit vector along `seed`, optionally leaning toward a second axis.
    fn embedding(seed: usize, lean: Option<(usize, f32)>) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[seed % EMBEDDING_DIM] = 1.0;
        if let Some((axis, weight)) = lean {
            v[axis % EMBEDDING_DIM] = weight;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter_mut().for_each(|x| *x /= norm);
        v
    }

    #[test]
    fn scope_resolution() {
        let mut store = test_store();
        store.upsert("alpha", &record("a", "x"), &embedding(0, None)).unwrap();
        store.upsert("beta", &record("b", "y"), &embedding(1, None)).unwrap();

        assert_eq!(SearchScope::All.resolve(&store).unwrap().len(), 2);
        assert_eq!(
            SearchScope::One("alpha".into()).resolve(&store).unwrap(),
            vec!["alpha".to_string()]
        );
        assert_eq!(
            SearchScope::Set(vec!["beta".into(), "missing".into()])
                .resolve(&store)
                .unwrap(),
            vec!["beta".to_string()]
        );
        assert!(SearchScope::One("missing".into())
            .resolve(&store)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn merges_and_reranks_across_collections() {
        let mut store = test_store();
        // "a" is an exact match, "b" in another collection is a near match.
        store.upsert("alpha", &record("a", "x"), &embedding(0, None)).unwrap();
        store
            .upsert("beta", &record("b", "y"), &embedding(0, Some((1, 0.3))))
            .unwrap();
        store.upsert("beta", &record("c", "z"), &embedding(200, None)).unwrap();

        let hits = search_with_embedding(&store, &embedding(0, None), &SearchScope::All, 10, 0.40)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.id, "a");
        assert_eq!(hits[0].collection, "alpha");
        assert_eq!(hits[1].record.id, "b");
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[test]
    fn threshold_returns_empty_not_error() {
        let mut store = test_store();
        store.upsert("alpha", &record("a", "x"), &embedding(0, None)).unwrap();

        // Orthogonal query: nothing clears the floor.
        let hits = search_with_embedding(&store, &embedding(300, None), &SearchScope::All, 10, 0.40)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn truncates_to_n() {
        let mut store = test_store();
        for i in 0..6 {
            store
                .upsert(
                    "alpha",
                    &record(&format!("r{i}"), "t"),
                    &embedding(0, Some((i + 1, 0.1 * (i as f32 + 1.0)))),
                )
                .unwrap();
        }
        let hits = search_with_embedding(&store, &embedding(0, None), &SearchScope::All, 3, 0.0)
            .unwrap();
        assert_eq!(hits.len(), 3);
    }
}
