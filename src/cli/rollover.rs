use anyhow::{bail, Result};

use crate::config::MnemoConfig;
use crate::error::MemoryError;
use crate::memory::rollover::rollover_log_source;
use crate::memory::store::DualStore;
use crate::memory::types::SourceKind;

/// Run a rollover pass over every enabled log source, or just the named one.
///
/// Returns `Ok(false)` on partial success so the caller can exit non-zero
/// while still printing per-source results.
pub async fn rollover(config: &MnemoConfig, source_name: Option<&str>) -> Result<bool> {
    let mut dual = DualStore::open(
        config.resolved_local_db_path(),
        config.resolved_global_db_path(),
    )?;
    let provider = super::create_provider_with_timeout(&config.embedding).await?;

    let sources: Vec<_> = match source_name {
        Some(name) => match config.source(name) {
            Some(s) if s.kind == SourceKind::Session => vec![s.clone()],
            Some(s) => bail!("source '{}' is not a log source ({})", name, s.kind),
            None => bail!("unknown source: {name}"),
        },
        None => config
            .enabled_sources()
            .filter(|s| s.kind == SourceKind::Session)
            .cloned()
            .collect(),
    };

    if sources.is_empty() {
        println!("No log sources configured.");
        return Ok(true);
    }

    let mut all_ok = true;
    for source in &sources {
        match rollover_log_source(source, &mut dual, provider.as_ref()) {
            Ok(Some(report)) => {
                println!(
                    "{}: archived {} record(s) to '{}' ({} -> {} lines, {} pinned kept)",
                    report.source,
                    report.archived,
                    report.collection,
                    report.size_before,
                    report.size_after,
                    report.pinned_kept,
                );
                if report.fragments_derived > 0 {
                    println!(
                        "{}: derived {} fragment(s) from the archived span",
                        report.source, report.fragments_derived
                    );
                }
                if report.rejected > 0 {
                    eprintln!(
                        "{}: {} malformed line(s) retained in source",
                        report.source, report.rejected
                    );
                    all_ok = false;
                }
                if report.partial_writes > 0 {
                    eprintln!(
                        "{}: {} write(s) queued for reconciliation (global store unavailable)",
                        report.source, report.partial_writes
                    );
                }
            }
            Ok(None) => {
                println!("{}: below limit, nothing to do", source.name);
            }
            Err(MemoryError::LockContention { path }) => {
                eprintln!(
                    "{}: locked by a concurrent operation ({}), skipped",
                    source.name,
                    path.display()
                );
                all_ok = false;
            }
            Err(e) => {
                eprintln!("{}: rollover failed: {e}", source.name);
                all_ok = false;
            }
        }
    }

    Ok(all_ok)
}
