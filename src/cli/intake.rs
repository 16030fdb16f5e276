use anyhow::Result;

use crate::config::MnemoConfig;
use crate::memory::intake::{intake_process, intake_status};
use crate::memory::rollover::SourceState;
use crate::memory::store::{DualStore, StoreScope, VectorStore};

/// Read-only view of every source: size, limits, state, backlog.
pub fn status(config: &MnemoConfig) -> Result<()> {
    let store = VectorStore::open(config.resolved_local_db_path(), StoreScope::Local)?;
    let report = intake_status(config, &store)?;

    if report.sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    for source in &report.sources {
        let state = match source.state {
            SourceState::BelowLimit => "below limit",
            SourceState::OverLimit => "OVER LIMIT",
        };
        println!(
            "{} [{}] -> '{}': {} item(s) (soft limit {}, keep {}) — {}",
            source.source,
            source.kind,
            source.collection,
            source.current_size,
            source.soft_limit,
            source.keep_recent,
            state,
        );
        if source.unprocessed > 0 {
            println!("    {} item(s) awaiting intake", source.unprocessed);
        }
    }

    if report.pending_sync > 0 {
        println!(
            "\n{} write(s) pending reconciliation to the global store",
            report.pending_sync
        );
    }

    Ok(())
}

/// Run one full intake sweep. Returns `Ok(false)` on partial success.
pub async fn process(config: &MnemoConfig) -> Result<bool> {
    let mut dual = DualStore::open(
        config.resolved_local_db_path(),
        config.resolved_global_db_path(),
    )?;
    let provider = super::create_provider_with_timeout(&config.embedding).await?;

    let report = intake_process(config, &mut dual, provider.as_ref())?;

    if report.reconcile.replayed > 0 || report.reconcile.failed > 0 {
        println!(
            "reconcile: {} replayed, {} dropped, {} still pending",
            report.reconcile.replayed, report.reconcile.dropped, report.reconcile.failed
        );
    }

    for source in &report.sources {
        if source.locked {
            eprintln!("{}: locked by a concurrent operation, skipped", source.source);
            continue;
        }
        println!(
            "{}: {} processed, {} skipped, {} relocated{}",
            source.source,
            source.processed,
            source.skipped,
            source.relocated,
            if source.failed > 0 {
                format!(", {} FAILED", source.failed)
            } else {
                String::new()
            },
        );
        for error in &source.errors {
            eprintln!("    {error}");
        }
    }

    Ok(report.all_ok())
}
