//! Schema normalizer — coerces heterogeneous JSON/text inputs into canonical
//! [`Record`]s before anything downstream touches them.
//!
//! Historical schema variants are handled by an explicit field-rename
//! migration table, not guesswork. Required fields are never silently
//! dropped: a missing `text` is a schema error naming the field; a missing
//! `id` is derived deterministically (UUID v5 over origin + text) so
//! re-archiving the same item upserts rather than duplicates.

use serde_json::Value;
use uuid::Uuid;

use crate::error::{MemoryError, Result};
use crate::memory::types::{Record, SourceKind};

/// Known historical field renames, applied before validation.
/// `(old_name, canonical_name)` — first match wins, canonical fields present
/// in the input are never overwritten.
const FIELD_MIGRATIONS: &[(&str, &str)] = &[
    ("content", "text"),
    ("body", "text"),
    ("message", "text"),
    ("uuid", "id"),
    ("key", "id"),
    ("timestamp", "created_at"),
    ("created", "created_at"),
    ("time", "created_at"),
    ("path", "origin_path"),
    ("file", "origin_path"),
    ("source", "origin_path"),
];

/// Normalize a raw JSON value into a canonical record.
pub fn normalize_json(raw: &Value, kind: SourceKind, origin_path: &str) -> Result<Record> {
    let obj = raw.as_object().ok_or_else(|| MemoryError::Schema {
        kind,
        reason: "input is not a JSON object".into(),
    })?;

    // Apply the migration table: copy legacy fields to their canonical names.
    let mut fields = obj.clone();
    for (old, canonical) in FIELD_MIGRATIONS {
        if !fields.contains_key(*canonical) {
            if let Some(value) = fields.get(*old).cloned() {
                fields.insert((*canonical).to_string(), value);
            }
        }
    }

    let text = fields
        .get("text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| MemoryError::Schema {
            kind,
            reason: "missing required field: text".into(),
        })?
        .to_string();

    let origin = fields
        .get("origin_path")
        .and_then(Value::as_str)
        .unwrap_or(origin_path)
        .to_string();

    let id = match fields.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Null) | None => deterministic_id(&origin, &text),
        Some(other) => {
            return Err(MemoryError::Schema {
                kind,
                reason: format!("malformed field: id (expected string, got {other})"),
            })
        }
    };

    let created_at = fields
        .get("created_at")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

    let pinned = fields.get("pinned").and_then(Value::as_bool).unwrap_or(false);

    // Everything not consumed above rides along as metadata. Dispatch is an
    // exhaustive match so each kind states what it keeps.
    let metadata = match kind {
        SourceKind::Session | SourceKind::PoolDoc | SourceKind::Plan | SourceKind::CodeSymbol => {
            leftover_metadata(&fields)
        }
        // Fragment metadata is the signature, written by the surfacing engine.
        SourceKind::Fragment => fields.get("signature").cloned().or_else(|| leftover_metadata(&fields)),
    };

    Ok(Record {
        id,
        text,
        source_kind: kind,
        origin_path: origin,
        created_at,
        pinned,
        superseded_by: None,
        metadata,
    })
}

/// Normalize one source line: JSON object lines go through [`normalize_json`],
/// anything else is wrapped as a plain-text record.
pub fn normalize_line(line: &str, kind: SourceKind, origin_path: &str) -> Result<Record> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(MemoryError::Schema {
            kind,
            reason: "missing required field: text".into(),
        });
    }

    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return normalize_json(&value, kind, origin_path);
        }
        // Fall through: a brace-leading line that is not valid JSON is plain text.
    }

    Ok(Record {
        id: deterministic_id(origin_path, trimmed),
        text: trimmed.to_string(),
        source_kind: kind,
        origin_path: origin_path.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
        pinned: false,
        superseded_by: None,
        metadata: None,
    })
}

/// Stable id for an archival input: UUID v5 over origin path + text, so the
/// same logical item always maps to the same id.
pub fn deterministic_id(origin_path: &str, text: &str) -> String {
    let name = format!("{origin_path}\n{text}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

const CANONICAL_FIELDS: &[&str] = &["id", "text", "created_at", "origin_path", "pinned"];

fn leftover_metadata(fields: &serde_json::Map<String, Value>) -> Option<Value> {
    let migrated: Vec<&str> = FIELD_MIGRATIONS.iter().map(|(old, _)| *old).collect();
    let extra: serde_json::Map<String, Value> = fields
        .iter()
        .filter(|(k, _)| !CANONICAL_FIELDS.contains(&k.as_str()) && !migrated.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if extra.is_empty() {
        None
    } else {
        Some(Value::Object(extra))
    }
}
