//! Retention/rollover engine for size-bounded log sources.
//!
//! State machine per source: `BelowLimit → OverLimit → Archiving →
//! Truncated → BelowLimit`. When a log exceeds its soft limit, the oldest
//! excess non-pinned records are normalized, embedded, and upserted into the
//! paired collection; only after every selected record is confirmed archived
//! is the source truncated. Archive-before-truncate, all-or-nothing, is the
//! central correctness property: any embedding or local-store failure
//! mid-batch aborts before truncation and the source stays `OverLimit` for
//! retry on the next trigger. Partial (global-only) write failures do not
//! abort — they are queued for reconciliation.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::config::SourceConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::memory::lock::SourceLock;
use crate::memory::normalize;
use crate::memory::store::{ArchiveSink, UpsertOutcome};
use crate::memory::surface;
use crate::memory::types::{Record, SourceKind};

/// Observable source states. `Archiving`/`Truncated` are transient within a
/// single rollover pass and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    BelowLimit,
    OverLimit,
}

/// What a rollover pass did to one source.
#[derive(Debug, Serialize)]
pub struct RolloverReport {
    pub source: String,
    pub collection: String,
    pub size_before: usize,
    pub size_after: usize,
    /// Records archived to the collection and evicted from the source.
    pub archived: usize,
    /// Pinned records retained regardless of age.
    pub pinned_kept: usize,
    /// Malformed lines rejected by the normalizer — retained in the source
    /// and reported, never silently discarded.
    pub rejected: usize,
    /// Upserts that landed locally but failed globally (queued for
    /// reconciliation).
    pub partial_writes: usize,
    /// Fragments derived from the archived span (session sources only,
    /// best-effort).
    pub fragments_derived: usize,
}

pub fn source_state(current_size: usize, soft_limit: usize) -> SourceState {
    if current_size > soft_limit {
        SourceState::OverLimit
    } else {
        SourceState::BelowLimit
    }
}

/// Count the lines of a log source without locking it.
pub fn log_size(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().count())
}

/// Run one rollover pass over a log source.
///
/// Returns `Ok(None)` when the source is below its soft limit. Holds the
/// source's advisory lock for the whole size-check → archive → truncate
/// sequence; the lock is released on every exit path.
pub fn rollover_log_source(
    source: &SourceConfig,
    sink: &mut dyn ArchiveSink,
    provider: &dyn EmbeddingProvider,
) -> Result<Option<RolloverReport>> {
    let path = source.resolved_path();
    if !path.exists() {
        return Ok(None);
    }

    let _lock = SourceLock::acquire(&path)?;

    let content = std::fs::read_to_string(&path)?;
    let lines: Vec<&str> = content.lines().collect();
    let size_before = lines.len();

    if source_state(size_before, source.soft_limit) == SourceState::BelowLimit {
        return Ok(None);
    }

    let excess = size_before.saturating_sub(source.keep_recent);
    let origin = path.to_string_lossy();

    // Classify every line. Pinned and malformed lines are never eviction
    // candidates; malformed ones are counted and reported.
    let mut candidates: Vec<(usize, Record)> = Vec::new();
    let mut pinned_total = 0usize;
    let mut rejected = 0usize;
    for (idx, line) in lines.iter().enumerate() {
        match normalize::normalize_line(line, source.kind, &origin) {
            Ok(record) => {
                if record.pinned || source.pinned_ids.contains(&record.id) {
                    pinned_total += 1;
                } else {
                    candidates.push((idx, record));
                }
            }
            Err(e) => {
                tracing::debug!(source = %source.name, line = idx + 1, error = %e, "rejected line");
                rejected += 1;
            }
        }
    }

    // Oldest excess non-pinned records, FIFO by original position.
    let selected: Vec<(usize, Record)> = candidates.into_iter().take(excess).collect();

    if selected.is_empty() {
        tracing::warn!(
            source = %source.name,
            size = size_before,
            "source over limit but nothing evictable (all pinned or rejected)"
        );
        return Ok(Some(RolloverReport {
            source: source.name.clone(),
            collection: source.collection.clone(),
            size_before,
            size_after: size_before,
            archived: 0,
            pinned_kept: pinned_total,
            rejected,
            partial_writes: 0,
            fragments_derived: 0,
        }));
    }

    tracing::info!(
        source = %source.name,
        collection = %source.collection,
        size = size_before,
        soft_limit = source.soft_limit,
        archiving = selected.len(),
        "rollover triggered"
    );

    // Embed the whole batch up front — an unavailable model defers the
    // entire rollover, leaving the source untouched.
    let texts: Vec<&str> = selected.iter().map(|(_, r)| r.text.as_str()).collect();
    let embeddings = provider.embed_batch(&texts)?;

    // Archive every selected record. A local store failure aborts the batch
    // before anything is truncated.
    let mut partial_writes = 0usize;
    for ((_, record), embedding) in selected.iter().zip(&embeddings) {
        match sink.upsert(&source.collection, record, embedding)? {
            UpsertOutcome::Complete => {}
            UpsertOutcome::Partial { .. } => partial_writes += 1,
        }
    }

    // Confirm 100% of the batch before truncation — archival is a
    // precondition for truncation, never the reverse.
    for (_, record) in &selected {
        if !sink.contains(&source.collection, &record.id)? {
            return Err(MemoryError::StoreWrite {
                collection: source.collection.clone(),
                id: record.id.clone(),
                reason: "archive confirmation failed before truncation".into(),
            });
        }
    }

    // Truncate: drop exactly the archived lines, keep everything else in
    // original order (newest records plus all pinned/rejected lines).
    let evicted: std::collections::HashSet<usize> =
        selected.iter().map(|(idx, _)| *idx).collect();
    let kept: Vec<&str> = lines
        .iter()
        .enumerate()
        .filter(|(idx, _)| !evicted.contains(idx))
        .map(|(_, line)| *line)
        .collect();
    write_atomic(&path, &kept)?;

    // Conversation that rolls over leaves a fragment behind: a signature
    // summary of the archived span, for associative recall later. Strictly
    // best-effort — a failure here never fails the rollover.
    let fragments_derived = if source.kind == SourceKind::Session {
        derive_span_fragment(source, &selected, sink, provider)
    } else {
        0
    };

    let report = RolloverReport {
        source: source.name.clone(),
        collection: source.collection.clone(),
        size_before,
        size_after: kept.len(),
        archived: selected.len(),
        pinned_kept: pinned_total,
        rejected,
        partial_writes,
        fragments_derived,
    };
    tracing::info!(
        source = %source.name,
        archived = report.archived,
        size_after = report.size_after,
        "rollover complete"
    );
    Ok(Some(report))
}

/// Records (oldest-first) contributing to a span fragment. Enough to catch
/// the span's character without embedding a novel.
const FRAGMENT_SPAN_RECORDS: usize = 50;

fn derive_span_fragment(
    source: &SourceConfig,
    archived: &[(usize, Record)],
    sink: &mut dyn ArchiveSink,
    provider: &dyn EmbeddingProvider,
) -> usize {
    let Some(provenance) = archived.first().map(|(_, r)| r.id.clone()) else {
        return 0;
    };
    let span: String = archived
        .iter()
        .take(FRAGMENT_SPAN_RECORDS)
        .map(|(_, r)| r.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let Some(fragment) = surface::extract_fragment(&span, &provenance, 0.0) else {
        return 0;
    };
    match surface::store_fragment(sink, provider, &fragment) {
        Ok(()) => 1,
        Err(e) => {
            tracing::warn!(source = %source.name, error = %e, "span fragment derivation failed");
            0
        }
    }
}

/// Rewrite the source via tmp + rename so a crash never leaves a half
/// truncated file.
fn write_atomic(path: &Path, lines: &[&str]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        for line in lines {
            writeln!(file, "{line}")?;
        }
        file.flush()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
