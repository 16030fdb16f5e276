//! Intake/monitor pipeline — a startup-triggered sweep over every configured
//! source.
//!
//! Oversized logs are handed to the rollover engine; new pool documents and
//! closed plan exports are normalized and upserted into their pool
//! collection, then over-limit overflow is relocated to the cold `.archive/`
//! directory (already vectorized, not re-embedded). The sweep is best-effort
//! over many independent items: per-record errors are collected and reported
//! without aborting; a local store-write failure aborts the enclosing
//! source's batch before anything is relocated. Rerunning after a partial
//! failure is safe — items already present by id are skipped.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{MnemoConfig, SourceConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::memory::lock::SourceLock;
use crate::memory::normalize;
use crate::memory::reconcile::{self, ReconcileReport};
use crate::memory::rollover::{self, SourceState};
use crate::memory::store::{ArchiveSink, DualStore, UpsertOutcome, VectorStore};
use crate::memory::types::{Record, SourceKind};

/// Per-source outcome of one sweep.
#[derive(Debug, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub kind: SourceKind,
    /// Records newly archived (or re-archived after a content change).
    pub processed: usize,
    /// Items already present by id and unchanged.
    pub skipped: usize,
    pub failed: usize,
    /// Files moved to the cold archive directory.
    pub relocated: usize,
    /// Source was locked by a concurrent operation and skipped.
    pub locked: bool,
    pub errors: Vec<String>,
}

impl SourceReport {
    fn new(source: &SourceConfig) -> Self {
        Self {
            source: source.name.clone(),
            kind: source.kind,
            processed: 0,
            skipped: 0,
            failed: 0,
            relocated: 0,
            locked: false,
            errors: Vec::new(),
        }
    }

    pub fn ok(&self) -> bool {
        !self.locked && self.failed == 0 && self.errors.is_empty()
    }
}

#[derive(Debug, Serialize)]
pub struct IntakeReport {
    pub reconcile: ReconcileReport,
    pub sources: Vec<SourceReport>,
}

impl IntakeReport {
    pub fn all_ok(&self) -> bool {
        self.sources.iter().all(SourceReport::ok)
    }
}

/// Run one full intake sweep: reconcile stragglers, then process every
/// enabled source. Per-source failures are reported, not propagated.
pub fn intake_process(
    config: &MnemoConfig,
    dual: &mut DualStore,
    provider: &dyn EmbeddingProvider,
) -> Result<IntakeReport> {
    let reconcile_report = reconcile::reconcile(dual)?;

    let mut sources = Vec::new();
    for source in config.enabled_sources() {
        let report = match source.kind {
            SourceKind::Session => process_log_source(source, dual, provider),
            SourceKind::PoolDoc | SourceKind::Plan | SourceKind::CodeSymbol => {
                process_directory_source(source, dual, provider)
            }
            // Fragments are rollover output, never a rollover input.
            SourceKind::Fragment => SourceReport::new(source),
        };
        sources.push(report);
    }

    Ok(IntakeReport {
        reconcile: reconcile_report,
        sources,
    })
}

fn process_log_source(
    source: &SourceConfig,
    dual: &mut DualStore,
    provider: &dyn EmbeddingProvider,
) -> SourceReport {
    let mut report = SourceReport::new(source);
    match rollover::rollover_log_source(source, dual, provider) {
        Ok(Some(rolled)) => {
            report.processed = rolled.archived;
            report.failed = rolled.rejected;
            if rolled.rejected > 0 {
                report
                    .errors
                    .push(format!("{} malformed line(s) retained in source", rolled.rejected));
            }
        }
        Ok(None) => {}
        Err(MemoryError::LockContention { path }) => {
            report.locked = true;
            report
                .errors
                .push(format!("locked by concurrent operation: {}", path.display()));
        }
        Err(e) => {
            report.failed += 1;
            report.errors.push(e.to_string());
        }
    }
    report
}

/// Process a directory source: archive new/changed files, then relocate
/// over-limit overflow to the cold archive.
fn process_directory_source(
    source: &SourceConfig,
    dual: &mut DualStore,
    provider: &dyn EmbeddingProvider,
) -> SourceReport {
    let mut report = SourceReport::new(source);
    let dir = source.resolved_path();
    if !dir.is_dir() {
        return report;
    }

    let _lock = match SourceLock::acquire(&dir) {
        Ok(lock) => lock,
        Err(MemoryError::LockContention { path }) => {
            report.locked = true;
            report
                .errors
                .push(format!("locked by concurrent operation: {}", path.display()));
            return report;
        }
        Err(e) => {
            report.failed += 1;
            report.errors.push(e.to_string());
            return report;
        }
    };

    let files = match active_files(source, &dir) {
        Ok(files) => files,
        Err(e) => {
            report.failed += 1;
            report.errors.push(e.to_string());
            return report;
        }
    };

    // Archive pass. A local store failure aborts this source's batch —
    // nothing gets relocated after that.
    let mut store_failed = false;
    let mut confirmed: Vec<PathBuf> = Vec::new();
    for path in &files {
        match archive_file(source, path, dual, provider) {
            Ok(FileOutcome::Archived) => {
                report.processed += 1;
                confirmed.push(path.clone());
            }
            Ok(FileOutcome::Unchanged) => {
                report.skipped += 1;
                confirmed.push(path.clone());
            }
            // Schema, embedding, or single-file read errors reject this
            // record only; the abort below is reserved for store failures.
            Err(e) if e.is_per_record() || matches!(e, MemoryError::Io(_)) => {
                report.failed += 1;
                report.errors.push(format!("{}: {e}", path.display()));
            }
            Err(e) => {
                report.failed += 1;
                report.errors.push(e.to_string());
                store_failed = true;
                break;
            }
        }
    }

    if store_failed {
        return report;
    }

    // Relocation pass: oldest excess beyond keep_recent, but only files
    // confirmed present in the store — archival precedes relocation.
    if confirmed.len() > source.keep_recent {
        let excess = confirmed.len() - source.keep_recent;
        let archive_dir = source.resolved_archive_dir();
        for path in confirmed.iter().take(excess) {
            match relocate(path, &archive_dir) {
                Ok(()) => report.relocated += 1,
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(format!("relocate {}: {e}", path.display()));
                }
            }
        }
    }

    report
}

enum FileOutcome {
    Archived,
    Unchanged,
}

fn archive_file(
    source: &SourceConfig,
    path: &Path,
    dual: &mut DualStore,
    provider: &dyn EmbeddingProvider,
) -> Result<FileOutcome> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let content = std::fs::read_to_string(path)?;

    // The logical item is the named file: its id stays stable across edits
    // so a changed document upserts rather than duplicates.
    let id = normalize::deterministic_id(&source.name, &file_name);

    let mut record = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| MemoryError::Schema {
                kind: source.kind,
                reason: format!("invalid JSON document: {e}"),
            })?;
        normalize::normalize_json(&value, source.kind, &path.to_string_lossy())?
    } else {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(MemoryError::Schema {
                kind: source.kind,
                reason: "missing required field: text".into(),
            });
        }
        Record {
            id: String::new(),
            text: trimmed.to_string(),
            source_kind: source.kind,
            origin_path: path.to_string_lossy().into_owned(),
            created_at: chrono::Utc::now().to_rfc3339(),
            pinned: false,
            superseded_by: None,
            metadata: None,
        }
    };
    record.id = id;

    // Idempotency gate: already archived and unchanged → skip.
    if let Some(existing) = dual.local.get(&source.collection, &record.id)? {
        if existing.text == record.text {
            return Ok(FileOutcome::Unchanged);
        }
        // Changed content gets a fresh timestamp so last-write-wins
        // reconciliation treats it as the newer copy.
        record.created_at = chrono::Utc::now().to_rfc3339();
    }

    let embedding = provider.embed(&record.text)?;
    match dual.upsert(&source.collection, &record, &embedding)? {
        UpsertOutcome::Complete => {}
        UpsertOutcome::Partial { reason } => {
            tracing::warn!(source = %source.name, id = %record.id, %reason, "partial write during intake");
        }
    }
    Ok(FileOutcome::Archived)
}

/// Active files of a directory source, oldest first (mtime, then name).
fn active_files(source: &SourceConfig, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !path.is_file() || name.starts_with('.') {
            continue;
        }
        if !source.matches_extension(&path) {
            continue;
        }
        let modified = entry
            .metadata()?
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        files.push((modified, path));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(files.into_iter().map(|(_, p)| p).collect())
}

fn relocate(path: &Path, archive_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(archive_dir)?;
    let name = path.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "file has no name")
    })?;
    std::fs::rename(path, archive_dir.join(name))?;
    Ok(())
}

// ── Status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SourceStatus {
    pub source: String,
    pub kind: SourceKind,
    pub path: String,
    pub collection: String,
    pub current_size: usize,
    pub soft_limit: usize,
    pub keep_recent: usize,
    pub state: SourceState,
    /// Items not yet present in the target collection (directories) or
    /// lines due for rollover (logs).
    pub unprocessed: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub sources: Vec<SourceStatus>,
    /// Partial writes awaiting reconciliation.
    pub pending_sync: usize,
}

/// Report sizes, limits, and backlog without mutating anything.
pub fn intake_status(config: &MnemoConfig, local: &VectorStore) -> Result<StatusReport> {
    let mut sources = Vec::new();
    for source in config.enabled_sources() {
        let path = source.resolved_path();
        let (current_size, unprocessed) = match source.kind {
            SourceKind::Session => {
                let size = rollover::log_size(&path)?;
                let due = if size > source.soft_limit {
                    size - source.keep_recent
                } else {
                    0
                };
                (size, due)
            }
            _ => {
                if path.is_dir() {
                    let files = active_files(source, &path)?;
                    let mut new = 0usize;
                    for file in &files {
                        let name = file
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        let id = normalize::deterministic_id(&source.name, &name);
                        if !local.contains(&source.collection, &id)? {
                            new += 1;
                        }
                    }
                    (files.len(), new)
                } else {
                    (0, 0)
                }
            }
        };

        sources.push(SourceStatus {
            source: source.name.clone(),
            kind: source.kind,
            path: path.to_string_lossy().into_owned(),
            collection: source.collection.clone(),
            current_size,
            soft_limit: source.soft_limit,
            keep_recent: source.keep_recent,
            state: rollover::source_state(current_size, source.soft_limit),
            unprocessed,
        });
    }

    Ok(StatusReport {
        sources,
        pending_sync: local.pending_sync_count()?,
    })
}
