use anyhow::Result;
use std::sync::Arc;

use crate::config::MnemoConfig;
use crate::memory::search::{search_with_embedding, SearchScope};
use crate::memory::store::{StoreScope, VectorStore};
use crate::memory::surface::FRAGMENTS_COLLECTION;
use crate::memory::types::FragmentSignature;

/// Search stored fragments by text and show their signatures.
pub async fn fragments(config: &MnemoConfig, query: &str, n: Option<usize>) -> Result<()> {
    let store = VectorStore::open(config.resolved_local_db_path(), StoreScope::Local)?;

    let provider = super::create_provider_with_timeout(&config.embedding).await?;
    let query_text = query.to_string();
    let ep = Arc::clone(&provider);
    let query_embedding = tokio::task::spawn_blocking(move || ep.embed(&query_text)).await??;

    let scope = SearchScope::One(FRAGMENTS_COLLECTION.to_string());
    let n = n.unwrap_or(config.search.default_max_results);
    let hits = search_with_embedding(
        &store,
        &query_embedding,
        &scope,
        n,
        config.search.min_similarity,
    )?;

    if hits.is_empty() {
        println!("No matching fragments.");
        return Ok(());
    }

    println!("Found {} fragment(s)\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "  {}. {} (similarity: {:.4})",
            i + 1,
            hit.record.id,
            hit.similarity
        );
        println!("     {}", hit.record.text);
        if let Some(signature) = hit
            .record
            .metadata
            .as_ref()
            .and_then(|m| m.get("signature"))
            .and_then(|s| serde_json::from_value::<FragmentSignature>(s.clone()).ok())
        {
            println!(
                "     stage: {}, mode: {}, valence: {:+.2}",
                signature.technical_stage.as_str(),
                signature.collaboration_mode.as_str(),
                signature.valence,
            );
            if !signature.keywords.is_empty() {
                println!("     keywords: {}", signature.keywords.join(", "));
            }
        }
        println!();
    }

    Ok(())
}
