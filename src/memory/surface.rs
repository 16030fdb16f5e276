//! Associative surfacing engine — non-query-driven recall.
//!
//! A span of live interaction text is reduced to a five-dimension signature
//! (technical stage, emotional valence, collaboration mode, learnings,
//! trigger keywords) and compared against stored fragment signatures with a
//! weighted similarity. At most one fragment surfaces per consideration, and
//! only when every per-session gate passes: similarity threshold, turns
//! elapsed since the last surfacing, cooldown timer, and a per-session cap.
//! Surfacing is best-effort by contract: any internal failure is logged and
//! swallowed, never propagated to the caller.

use chrono::{DateTime, Utc};

use crate::config::SurfacingConfig;
use crate::error::Result;
use crate::memory::store::VectorStore;
use crate::memory::types::{
    CollaborationMode, Fragment, FragmentSignature, Record, SourceKind, TechnicalStage,
};

/// Collection fragments live in. Created on first write like any other.
pub const FRAGMENTS_COLLECTION: &str = "fragments";

const MAX_KEYWORDS: usize = 12;
const MAX_LEARNINGS: usize = 5;
const SUMMARY_LEN: usize = 140;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "this", "with", "was", "are", "but", "not", "you", "have",
    "had", "has", "its", "it's", "from", "they", "them", "then", "than", "will", "would",
    "could", "should", "what", "when", "where", "which", "into", "about", "just", "also",
    "can", "get", "got", "our", "out", "all", "one", "two", "now", "here", "there", "some",
    "more", "been", "were", "did", "does", "don't", "let's", "lets", "like", "need", "want",
];

// ── Signature extraction ─────────────────────────────────────────────────────

/// Reduce a span of interaction text to its five-dimension signature.
pub fn extract_signature(text: &str) -> FragmentSignature {
    let tokens = tokenize(text);
    FragmentSignature {
        technical_stage: detect_stage(&tokens),
        valence: score_valence(&tokens),
        collaboration_mode: detect_mode(&tokens),
        learnings: extract_learnings(text),
        keywords: extract_keywords(&tokens),
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'' && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn extract_keywords(tokens: &[String]) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for token in tokens {
        if token.len() < 3 || STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if !keywords.iter().any(|k| k == token) {
            keywords.push(token.clone());
        }
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
    }
    keywords
}

fn detect_stage(tokens: &[String]) -> TechnicalStage {
    let buckets: &[(TechnicalStage, &[&str])] = &[
        (
            TechnicalStage::Debugging,
            &["error", "bug", "fail", "failed", "failing", "panic", "crash", "broken", "debug", "fix", "fixed", "stack", "trace"],
        ),
        (
            TechnicalStage::Planning,
            &["plan", "planning", "design", "approach", "propose", "proposal", "scope", "roadmap", "decide"],
        ),
        (
            TechnicalStage::Review,
            &["review", "refactor", "cleanup", "simplify", "rename", "nit", "style", "readability"],
        ),
        (
            TechnicalStage::Implementation,
            &["implement", "implemented", "add", "added", "write", "wrote", "build", "built", "wire", "create", "code"],
        ),
        (
            TechnicalStage::Exploration,
            &["explore", "investigate", "look", "wonder", "curious", "read", "understand", "check", "compare"],
        ),
    ];

    let mut best = TechnicalStage::Exploration;
    let mut best_hits = 0usize;
    for (stage, words) in buckets {
        let hits = tokens.iter().filter(|t| words.contains(&t.as_str())).count();
        if hits > best_hits {
            best_hits = hits;
            best = *stage;
        }
    }
    best
}

fn score_valence(tokens: &[String]) -> f64 {
    const POSITIVE: &[&str] = &[
        "works", "working", "passes", "passed", "fixed", "solved", "great", "nice", "clean",
        "good", "success", "finally", "perfect", "excellent", "love", "happy",
    ];
    const NEGATIVE: &[&str] = &[
        "fail", "failed", "failing", "error", "broken", "stuck", "wrong", "bad", "crash",
        "frustrating", "annoying", "confusing", "regression", "worse", "ugh",
    ];

    let pos = tokens.iter().filter(|t| POSITIVE.contains(&t.as_str())).count() as f64;
    let neg = tokens.iter().filter(|t| NEGATIVE.contains(&t.as_str())).count() as f64;
    if pos + neg == 0.0 {
        return 0.0;
    }
    ((pos - neg) / (pos + neg)).clamp(-1.0, 1.0)
}

fn detect_mode(tokens: &[String]) -> CollaborationMode {
    let cues: &[(CollaborationMode, &[&str])] = &[
        (
            CollaborationMode::Teaching,
            &["explain", "teach", "learn", "example", "why", "how", "means", "meaning"],
        ),
        (
            CollaborationMode::Pairing,
            &["we", "let's", "lets", "our", "together", "both"],
        ),
        (
            CollaborationMode::Directed,
            &["please", "must", "change", "make", "use", "instead", "don't", "never"],
        ),
    ];

    let mut best = CollaborationMode::Autonomous;
    let mut best_hits = 0usize;
    for (mode, words) in cues {
        let hits = tokens.iter().filter(|t| words.contains(&t.as_str())).count();
        if hits > best_hits {
            best_hits = hits;
            best = *mode;
        }
    }
    best
}

/// Sentences that read like captured lessons, trimmed and capped.
fn extract_learnings(text: &str) -> Vec<String> {
    const MARKERS: &[&str] = &[
        "learned", "turns out", "note:", "til ", "gotcha", "remember that", "insight",
        "the trick", "key point",
    ];
    let mut learnings = Vec::new();
    for sentence in text.split(['.', '\n', '!', '?']) {
        let trimmed = sentence.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lower = trimmed.to_lowercase();
        if MARKERS.iter().any(|m| lower.contains(m)) {
            let mut s = trimmed.to_string();
            if s.len() > 160 {
                s.truncate(160);
            }
            learnings.push(s);
            if learnings.len() >= MAX_LEARNINGS {
                break;
            }
        }
    }
    learnings
}

// ── Weighted similarity ──────────────────────────────────────────────────────

/// Weighted similarity over the five signature dimensions, in `[0, 1]`.
/// Keywords dominate (0.40); the remaining dimensions carry 0.15 each.
pub fn weighted_similarity(a: &FragmentSignature, b: &FragmentSignature) -> f64 {
    let keywords = jaccard(&a.keywords, &b.keywords);
    let stage = if a.technical_stage == b.technical_stage { 1.0 } else { 0.0 };
    let valence = 1.0 - (a.valence - b.valence).abs() / 2.0;
    let mode = if a.collaboration_mode == b.collaboration_mode { 1.0 } else { 0.0 };
    let learnings = jaccard(&a.learnings, &b.learnings);

    0.40 * keywords + 0.15 * stage + 0.15 * valence + 0.15 * mode + 0.15 * learnings
}

/// Jaccard over case-folded sets. Two empty sets compare as identical.
fn jaccard(a: &[String], b: &[String]) -> f64 {
    use std::collections::HashSet;
    let a: HashSet<String> = a.iter().map(|s| s.to_lowercase()).collect();
    let b: HashSet<String> = b.iter().map(|s| s.to_lowercase()).collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        inter / union
    }
}

// ── Fragment derivation and persistence ──────────────────────────────────────

/// Derive a fragment from a span of session text. Returns `None` when the
/// span is too thin to describe (no extractable keywords).
pub fn extract_fragment(
    text: &str,
    session_record_id: &str,
    relevance_threshold: f64,
) -> Option<Fragment> {
    let signature = extract_signature(text);
    if signature.keywords.is_empty() {
        return None;
    }
    Some(Fragment {
        id: uuid::Uuid::now_v7().to_string(),
        summary: summarize(text),
        signature,
        relevance_threshold,
        session_record_id: session_record_id.to_string(),
        created_at: Utc::now().to_rfc3339(),
    })
}

fn summarize(text: &str) -> String {
    let first = text
        .split(['.', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("");
    let mut summary = first.to_string();
    if summary.len() > SUMMARY_LEN {
        // Truncate on a char boundary.
        let cut = summary
            .char_indices()
            .take_while(|(i, _)| *i < SUMMARY_LEN)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        summary.truncate(cut);
    }
    summary
}

/// Persist a fragment as a record in the fragments collection. The summary
/// is the record text; the signature rides along as metadata so matching
/// never needs to re-extract it.
pub fn store_fragment(
    sink: &mut dyn crate::memory::store::ArchiveSink,
    provider: &dyn crate::embedding::EmbeddingProvider,
    fragment: &Fragment,
) -> Result<()> {
    let record = fragment_to_record(fragment);
    let embedding = provider.embed(&record.text)?;
    sink.upsert(FRAGMENTS_COLLECTION, &record, &embedding)?;
    Ok(())
}

fn fragment_to_record(fragment: &Fragment) -> Record {
    Record {
        id: fragment.id.clone(),
        text: fragment.summary.clone(),
        source_kind: SourceKind::Fragment,
        origin_path: fragment.session_record_id.clone(),
        created_at: fragment.created_at.clone(),
        pinned: false,
        superseded_by: None,
        metadata: Some(serde_json::json!({
            "signature": fragment.signature,
            "relevance_threshold": fragment.relevance_threshold,
            "session_record_id": fragment.session_record_id,
        })),
    }
}

fn record_to_fragment(record: &Record) -> Option<Fragment> {
    let meta = record.metadata.as_ref()?;
    let signature: FragmentSignature =
        serde_json::from_value(meta.get("signature")?.clone()).ok()?;
    let relevance_threshold = meta
        .get("relevance_threshold")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    let session_record_id = meta
        .get("session_record_id")
        .and_then(|v| v.as_str())
        .unwrap_or(&record.origin_path)
        .to_string();
    Some(Fragment {
        id: record.id.clone(),
        summary: record.text.clone(),
        signature,
        relevance_threshold,
        session_record_id,
        created_at: record.created_at.clone(),
    })
}

// ── Per-session gating ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SurfaceState {
    surfaced_count: u32,
    last_surfaced_at: Option<DateTime<Utc>>,
    last_turn: u64,
}

fn load_state(store: &VectorStore, session_id: &str) -> Result<SurfaceState> {
    let row = store
        .raw()
        .query_row(
            "SELECT surfaced_count, last_surfaced_at, last_turn
             FROM surface_state WHERE session_id = ?1",
            [session_id],
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, Option<String>>(1)?,
                    r.get::<_, i64>(2)?,
                ))
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    Ok(match row {
        Some((count, at, turn)) => SurfaceState {
            surfaced_count: count as u32,
            last_surfaced_at: at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|t| t.with_timezone(&Utc)),
            last_turn: turn as u64,
        },
        None => SurfaceState::default(),
    })
}

fn save_state(store: &VectorStore, session_id: &str, state: &SurfaceState) -> Result<()> {
    store.raw().execute(
        "INSERT INTO surface_state (session_id, surfaced_count, last_surfaced_at, last_turn)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(session_id) DO UPDATE SET
             surfaced_count = excluded.surfaced_count,
             last_surfaced_at = excluded.last_surfaced_at,
             last_turn = excluded.last_turn",
        rusqlite::params![
            session_id,
            state.surfaced_count as i64,
            state.last_surfaced_at.map(|t| t.to_rfc3339()),
            state.last_turn as i64,
        ],
    )?;
    Ok(())
}

/// Consider surfacing a fragment against a live text window.
///
/// Returns at most one fragment, and only when every gate passes. Failure
/// anywhere below is logged and swallowed — surfacing never breaks the
/// caller's flow.
pub fn consider(
    store: &VectorStore,
    config: &SurfacingConfig,
    live_text: &str,
    session_id: &str,
    turn: u64,
    now: DateTime<Utc>,
) -> Option<(Fragment, f64)> {
    match consider_inner(store, config, live_text, session_id, turn, now) {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(session = session_id, error = %e, "surfacing pass failed");
            None
        }
    }
}

fn consider_inner(
    store: &VectorStore,
    config: &SurfacingConfig,
    live_text: &str,
    session_id: &str,
    turn: u64,
    now: DateTime<Utc>,
) -> Result<Option<(Fragment, f64)>> {
    if !config.enabled {
        return Ok(None);
    }

    let state = load_state(store, session_id)?;
    if state.surfaced_count >= config.max_fragments_per_session {
        return Ok(None);
    }
    if let Some(last) = state.last_surfaced_at {
        if turn.saturating_sub(state.last_turn) < config.min_messages_between {
            return Ok(None);
        }
        let elapsed = now.signed_duration_since(last);
        if elapsed < chrono::Duration::seconds(config.cooldown_secs as i64) {
            return Ok(None);
        }
    }

    let live = extract_signature(live_text);
    if live.keywords.is_empty() {
        return Ok(None);
    }

    let mut best: Option<(Fragment, f64)> = None;
    for record in store.list(FRAGMENTS_COLLECTION)? {
        let Some(fragment) = record_to_fragment(&record) else {
            continue;
        };
        let score = weighted_similarity(&live, &fragment.signature);
        if score < config.threshold.max(fragment.relevance_threshold) {
            continue;
        }
        if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
            best = Some((fragment, score));
        }
    }

    if let Some((fragment, score)) = &best {
        save_state(
            store,
            session_id,
            &SurfaceState {
                surfaced_count: state.surfaced_count + 1,
                last_surfaced_at: Some(now),
                last_turn: turn,
            },
        )?;
        tracing::info!(
            session = session_id,
            fragment = %fragment.id,
            similarity = score,
            "surfaced fragment"
        );
    }
    Ok(best)
}
