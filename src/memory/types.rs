//! Core record and fragment type definitions.
//!
//! Defines [`SourceKind`] (the five origins a record can have), [`Record`]
//! (the atomic archived unit), and [`Fragment`] with its five-dimension
//! [`FragmentSignature`] used by the associative surfacing engine.

use serde::{Deserialize, Serialize};

/// Where an archived record originated. Dispatch over this enum is always an
/// exhaustive `match` so a new kind is a compile-time gap, not a runtime
/// surprise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Rolling session logs — line-oriented, rolled over when oversized.
    Session,
    /// Documents dropped into a pool directory.
    PoolDoc,
    /// Closed workflow plan exports.
    Plan,
    /// Archived source-code symbols.
    CodeSymbol,
    /// Derived conversation fragments — written once, never rolled over.
    Fragment,
}

impl SourceKind {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::PoolDoc => "pool_doc",
            Self::Plan => "plan",
            Self::CodeSymbol => "code_symbol",
            Self::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(Self::Session),
            "pool_doc" => Ok(Self::PoolDoc),
            "plan" => Ok(Self::Plan),
            "code_symbol" => Ok(Self::CodeSymbol),
            "fragment" => Ok(Self::Fragment),
            _ => Err(format!("unknown source kind: {s}")),
        }
    }
}

/// The atomic unit archived into a collection.
///
/// Records are immutable once persisted — an update is a new record plus
/// `superseded_by` on the old one, never in-place mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Opaque id, unique within a collection. Deterministic (UUID v5 over
    /// origin + text) for archival inputs so re-archiving upserts.
    pub id: String,
    /// Full text content.
    pub text: String,
    /// Origin of this record.
    pub source_kind: SourceKind,
    /// Path of the source the record was extracted from.
    pub origin_path: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// Pinned records are never selected for eviction, regardless of age.
    #[serde(default)]
    pub pinned: bool,
    /// If replaced, the id of the replacement record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    /// Arbitrary JSON metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Dominant technical activity of a span of interaction text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnicalStage {
    Exploration,
    Planning,
    Implementation,
    Debugging,
    Review,
}

impl TechnicalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exploration => "exploration",
            Self::Planning => "planning",
            Self::Implementation => "implementation",
            Self::Debugging => "debugging",
            Self::Review => "review",
        }
    }
}

/// How the participants were working together in a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationMode {
    Pairing,
    Directed,
    Autonomous,
    Teaching,
}

impl CollaborationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pairing => "pairing",
            Self::Directed => "directed",
            Self::Autonomous => "autonomous",
            Self::Teaching => "teaching",
        }
    }
}

/// Five independent dimensions summarizing a span of interaction text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentSignature {
    pub technical_stage: TechnicalStage,
    /// Emotional valence in `[-1.0, 1.0]`.
    pub valence: f64,
    pub collaboration_mode: CollaborationMode,
    /// Extracted learnings — short normalized phrases.
    pub learnings: Vec<String>,
    /// Trigger keywords — lowercase, stopwords stripped.
    pub keywords: Vec<String>,
}

/// A derived summary of a span of interaction text. Fragments are themselves
/// the rollover output of conversation, not a rollover input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    /// UUID v7 (time-sortable).
    pub id: String,
    /// Short text summary, used as the record text when persisted.
    pub summary: String,
    pub signature: FragmentSignature,
    /// Minimum weighted similarity live context must reach to resurface this.
    pub relevance_threshold: f64,
    /// Provenance pointer back to the originating session record.
    pub session_record_id: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn source_kind_round_trips() {
        for kind in [
            SourceKind::Session,
            SourceKind::PoolDoc,
            SourceKind::Plan,
            SourceKind::CodeSymbol,
            SourceKind::Fragment,
        ] {
            assert_eq!(SourceKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn source_kind_rejects_unknown() {
        assert!(SourceKind::from_str("telemetry").is_err());
    }

    #[test]
    fn record_serde_omits_empty_optionals() {
        let record = Record {
            id: "r1".into(),
            text: "hello".into(),
            source_kind: SourceKind::Session,
            origin_path: "logs/session.jsonl".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            pinned: false,
            superseded_by: None,
            metadata: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("superseded_by").is_none());
        assert!(json.get("metadata").is_none());
        assert_eq!(json["source_kind"], "session");
    }
}
