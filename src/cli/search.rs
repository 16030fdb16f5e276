use anyhow::Result;
use std::sync::Arc;

use crate::config::MnemoConfig;
use crate::memory::search::{search_with_embedding, SearchScope};
use crate::memory::store::{StoreScope, VectorStore};

/// Run a search from the terminal against the local store.
pub async fn search(
    config: &MnemoConfig,
    query: &str,
    scope: &[String],
    n: Option<usize>,
    min_similarity: Option<f64>,
) -> Result<()> {
    let store = VectorStore::open(config.resolved_local_db_path(), StoreScope::Local)?;

    let provider = super::create_provider_with_timeout(&config.embedding).await?;
    let query_text = query.to_string();
    let ep = Arc::clone(&provider);
    let query_embedding = tokio::task::spawn_blocking(move || ep.embed(&query_text)).await??;

    let scope = match scope {
        [] => SearchScope::All,
        [one] => SearchScope::One(one.clone()),
        many => SearchScope::Set(many.to_vec()),
    };
    let n = n.unwrap_or(config.search.default_max_results);
    let min_similarity = min_similarity.unwrap_or(config.search.min_similarity);

    let hits = search_with_embedding(&store, &query_embedding, &scope, n, min_similarity)?;

    if hits.is_empty() {
        // Empty is a valid outcome, not an error: nothing cleared the floor.
        println!("No results above similarity {min_similarity:.2}.");
        return Ok(());
    }

    println!("Found {} result(s)\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let preview = if hit.record.text.len() > 120 {
            let cut = hit
                .record
                .text
                .char_indices()
                .take_while(|(idx, _)| *idx < 120)
                .last()
                .map(|(idx, c)| idx + c.len_utf8())
                .unwrap_or(0);
            format!("{}...", &hit.record.text[..cut])
        } else {
            hit.record.text.clone()
        };

        println!(
            "  {}. [{}] {} (similarity: {:.4})",
            i + 1,
            hit.collection,
            hit.record.id,
            hit.similarity,
        );
        println!("     {}", preview);
        println!();
    }

    Ok(())
}
