use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::memory::types::SourceKind;

/// Top-level configuration, read from a JSON document. The engine reads this
/// file but does not own it — the surrounding tooling writes it.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MnemoConfig {
    pub log_level: String,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub surfacing: SurfacingConfig,
    pub sources: Vec<SourceConfig>,
}

/// Paths for the dual-write store pair. The global store is the shared
/// system of record; the local store is workspace-scoped.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub local_db_path: String,
    pub global_db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    /// Timeout around model load — first-load latency is the dominant
    /// variable cost, so it gets an explicit bound.
    pub load_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub default_max_results: usize,
    /// Minimum cosine similarity a result must clear to be returned.
    pub min_similarity: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SurfacingConfig {
    pub enabled: bool,
    /// Minimum weighted signature similarity to surface a fragment.
    pub threshold: f64,
    pub cooldown_secs: u64,
    pub max_fragments_per_session: u32,
    pub min_messages_between: u64,
}

/// A size-bounded mutable source: a rolling log file or a directory of
/// dropped documents / closed plan exports.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    /// Log file path for `session` sources, directory for the rest.
    pub path: String,
    /// Collection this source archives into.
    pub collection: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Size (lines or items) above which a rollover is triggered.
    #[serde(default = "default_soft_limit")]
    pub soft_limit: usize,
    /// Target size after rollover (`keep_recent` for directories).
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
    /// File extensions considered for directory sources.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Cold-archive directory for over-limit overflow. Defaults to
    /// `<path>/.archive` for directories, `<path>.archive/` for logs.
    #[serde(default)]
    pub archive_dir: Option<String>,
    /// Record ids exempt from eviction regardless of age.
    #[serde(default)]
    pub pinned_ids: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_soft_limit() -> usize {
    600
}

fn default_keep_recent() -> usize {
    500
}

fn default_extensions() -> Vec<String> {
    vec!["md".into(), "txt".into(), "json".into()]
}

impl Default for MnemoConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            surfacing: SurfacingConfig::default(),
            sources: default_sources(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_db_path: ".mnemo/memory.db".into(),
            global_db_path: default_mnemo_dir()
                .join("global.db")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_mnemo_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            load_timeout_secs: 60,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_max_results: 8,
            min_similarity: 0.40,
        }
    }
}

impl Default for SurfacingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.30,
            cooldown_secs: 300,
            max_fragments_per_session: 3,
            min_messages_between: 5,
        }
    }
}

/// Sources assumed when the config document does not declare any.
fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "session-log".into(),
            kind: SourceKind::Session,
            path: "logs/session.jsonl".into(),
            collection: "session_log".into(),
            enabled: true,
            soft_limit: 600,
            keep_recent: 500,
            extensions: vec![],
            archive_dir: None,
            pinned_ids: vec![],
        },
        SourceConfig {
            name: "pool".into(),
            kind: SourceKind::PoolDoc,
            path: "pool".into(),
            collection: "pool_docs".into(),
            enabled: true,
            soft_limit: 40,
            keep_recent: 20,
            extensions: default_extensions(),
            archive_dir: None,
            pinned_ids: vec![],
        },
        SourceConfig {
            name: "plans".into(),
            kind: SourceKind::Plan,
            path: "plans/closed".into(),
            collection: "plans".into(),
            enabled: true,
            soft_limit: 40,
            keep_recent: 20,
            extensions: vec!["md".into(), "json".into()],
            archive_dir: None,
            pinned_ids: vec![],
        },
    ]
}

/// Returns `~/.mnemo/`
pub fn default_mnemo_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".mnemo")
}

/// Returns the default config file path: `~/.mnemo/config.json`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("MNEMO_CONFIG") {
        return PathBuf::from(path);
    }
    default_mnemo_dir().join("config.json")
}

impl MnemoConfig {
    /// Load config from the JSON document (if it exists) then apply env var
    /// overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            serde_json::from_str(&contents).context("failed to parse config JSON")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MnemoConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (MNEMO_LOCAL_DB, MNEMO_GLOBAL_DB,
    /// MNEMO_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MNEMO_LOCAL_DB") {
            self.storage.local_db_path = val;
        }
        if let Ok(val) = std::env::var("MNEMO_GLOBAL_DB") {
            self.storage.global_db_path = val;
        }
        if let Ok(val) = std::env::var("MNEMO_LOG_LEVEL") {
            self.log_level = val;
        }
    }

    /// Resolve the local store path, expanding `~` if needed.
    pub fn resolved_local_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.local_db_path)
    }

    /// Resolve the global store path, expanding `~` if needed.
    pub fn resolved_global_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.global_db_path)
    }

    /// Enabled sources only, in declaration order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// Find a source by name.
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }
}

impl SourceConfig {
    /// Resolved source path.
    pub fn resolved_path(&self) -> PathBuf {
        expand_tilde(&self.path)
    }

    /// Cold-archive directory for this source.
    pub fn resolved_archive_dir(&self) -> PathBuf {
        match &self.archive_dir {
            Some(dir) => expand_tilde(dir),
            None => match self.kind {
                SourceKind::Session => {
                    let mut name = self
                        .resolved_path()
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "source".into());
                    name.push_str(".archive");
                    self.resolved_path().with_file_name(name)
                }
                _ => self.resolved_path().join(".archive"),
            },
        }
    }

    /// Whether a directory entry matches this source's extension filter.
    pub fn matches_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
