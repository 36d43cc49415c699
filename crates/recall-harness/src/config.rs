//! TOML configuration parsing and validation.
//!
//! Every section is optional except `[corpus]`; missing keys fall back to
//! the `default_*` values below. A leading `~/` in any path is expanded
//! with `$HOME`. See `config/recall.example.toml` for a full example.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use recall_harness_core::chunk::{
    ChunkParams, DEFAULT_FLUSH_THRESHOLD, DEFAULT_OVERLAP_LINES, DEFAULT_TARGET_SIZE,
};
use recall_harness_core::error::RecallError;
use recall_harness_core::recall::{
    RecallParams, ARCHIVAL_SCORE, DEDUP_PREFIX_CHARS, DEFAULT_FACT_SCORE, MAX_TEXT_CHARS,
    OVER_FETCH_FACTOR,
};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub facts: FactsConfig,
    /// Absent section means no archival backend.
    #[serde(default)]
    pub archival: Option<ArchivalConfig>,
    #[serde(default)]
    pub recall: RecallConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Distinguished top-level file, indexed before the directory.
    #[serde(default)]
    pub root_file: Option<PathBuf>,
    pub dir: PathBuf,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default = "default_true")]
    pub follow_symlinks: bool,
}

fn default_pattern() -> String {
    "*.md".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("~/.recall/index_state.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_size")]
    pub target_size: usize,
    #[serde(default = "default_overlap_lines")]
    pub overlap_lines: usize,
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            overlap_lines: DEFAULT_OVERLAP_LINES,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

fn default_target_size() -> usize {
    DEFAULT_TARGET_SIZE
}
fn default_overlap_lines() -> usize {
    DEFAULT_OVERLAP_LINES
}
fn default_flush_threshold() -> usize {
    DEFAULT_FLUSH_THRESHOLD
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        ChunkParams {
            target_size: self.target_size,
            overlap_lines: self.overlap_lines,
            flush_threshold: self.flush_threshold,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    #[serde(default = "default_sqlite")]
    pub provider: String,
    #[serde(default = "default_vector_path")]
    pub path: PathBuf,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            provider: default_sqlite(),
            path: default_vector_path(),
        }
    }
}

fn default_sqlite() -> String {
    "sqlite".to_string()
}
fn default_vector_path() -> PathBuf {
    PathBuf::from("~/.recall/vectors.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct FactsConfig {
    #[serde(default = "default_sqlite")]
    pub provider: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_facts_path")]
    pub path: PathBuf,
    #[serde(default = "default_mem0_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FactsConfig {
    fn default() -> Self {
        Self {
            provider: default_sqlite(),
            subject: default_subject(),
            path: default_facts_path(),
            base_url: default_mem0_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_subject() -> String {
    "atlas".to_string()
}
fn default_facts_path() -> PathBuf {
    PathBuf::from("~/.recall/facts.sqlite")
}
fn default_mem0_url() -> String {
    "https://api.mem0.ai".to_string()
}
fn default_api_key_env() -> String {
    "MEM0_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchivalConfig {
    #[serde(default = "default_archival_provider")]
    pub provider: String,
    #[serde(default = "default_letta_url")]
    pub base_url: String,
    #[serde(default = "default_subject")]
    pub agent_name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub mirror_on_index: bool,
    /// System prompt for an agent created on first connect.
    #[serde(default = "default_agent_system")]
    pub system: String,
    /// Core memory blocks seeded into a newly created agent.
    #[serde(default)]
    pub memory_blocks: Vec<MemoryBlock>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MemoryBlock {
    pub label: String,
    pub value: String,
}

fn default_archival_provider() -> String {
    "letta".to_string()
}
fn default_letta_url() -> String {
    "http://localhost:8283".to_string()
}
fn default_agent_system() -> String {
    "You are an assistant with persistent memory.".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecallConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_over_fetch")]
    pub over_fetch: usize,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_dedup_prefix_chars")]
    pub dedup_prefix_chars: usize,
    #[serde(default = "default_fact_score")]
    pub fact_default_score: f64,
    #[serde(default = "default_archival_score")]
    pub archival_score: f64,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            over_fetch: OVER_FETCH_FACTOR,
            max_text_chars: MAX_TEXT_CHARS,
            dedup_prefix_chars: DEDUP_PREFIX_CHARS,
            fact_default_score: DEFAULT_FACT_SCORE,
            archival_score: ARCHIVAL_SCORE,
        }
    }
}

fn default_limit() -> usize {
    5
}
fn default_over_fetch() -> usize {
    OVER_FETCH_FACTOR
}
fn default_max_text_chars() -> usize {
    MAX_TEXT_CHARS
}
fn default_dedup_prefix_chars() -> usize {
    DEDUP_PREFIX_CHARS
}
fn default_fact_score() -> f64 {
    DEFAULT_FACT_SCORE
}
fn default_archival_score() -> f64 {
    ARCHIVAL_SCORE
}

impl Config {
    /// Ranking parameters, scoped to the configured fact subject.
    pub fn recall_params(&self) -> RecallParams {
        RecallParams {
            subject: self.facts.subject.clone(),
            over_fetch: self.recall.over_fetch,
            max_text_chars: self.recall.max_text_chars,
            dedup_prefix_chars: self.recall.dedup_prefix_chars,
            fact_default_score: self.recall.fact_default_score,
            archival_score: self.recall.archival_score,
        }
    }
}

fn invalid(msg: impl Into<String>) -> anyhow::Error {
    RecallError::config(msg).into()
}

/// Expand a leading `~/` with `$HOME`.
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = std::env::var_os("HOME")
        .ok_or_else(|| invalid(format!("cannot expand {}: HOME is not set", path.display())))?;
    Ok(PathBuf::from(home).join(rest))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| invalid(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| invalid(format!("failed to parse {}: {}", path.display(), e)))?;

    resolve(config)
}

/// Validate a parsed config and expand its paths.
pub fn resolve(mut config: Config) -> Result<Config> {
    // Validate chunking
    if config.chunking.target_size == 0 {
        return Err(invalid("chunking.target_size must be > 0"));
    }
    if config.chunking.flush_threshold >= config.chunking.target_size {
        return Err(invalid(
            "chunking.flush_threshold must be < chunking.target_size",
        ));
    }

    // Validate recall
    let r = &config.recall;
    if r.limit < 1 {
        return Err(invalid("recall.limit must be >= 1"));
    }
    if r.over_fetch < 1 {
        return Err(invalid("recall.over_fetch must be >= 1"));
    }
    if r.max_text_chars == 0 || r.dedup_prefix_chars == 0 {
        return Err(invalid(
            "recall.max_text_chars and recall.dedup_prefix_chars must be > 0",
        ));
    }
    for (key, value) in [
        ("recall.fact_default_score", r.fact_default_score),
        ("recall.archival_score", r.archival_score),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid(format!("{} must be in [0.0, 1.0]", key)));
        }
    }

    match config.vector.provider.as_str() {
        "sqlite" | "memory" => {}
        other => {
            return Err(invalid(format!(
                "Unknown vector provider: '{}'. Must be sqlite or memory.",
                other
            )))
        }
    }

    match config.facts.provider.as_str() {
        "sqlite" | "memory" => {}
        "mem0" => {
            if config.facts.api_key_env.trim().is_empty() {
                return Err(invalid("facts.api_key_env must be set when provider is 'mem0'"));
            }
        }
        other => {
            return Err(invalid(format!(
                "Unknown facts provider: '{}'. Must be sqlite, memory, or mem0.",
                other
            )))
        }
    }
    if config.facts.subject.trim().is_empty() {
        return Err(invalid("facts.subject must not be empty"));
    }

    if let Some(archival) = &config.archival {
        if archival.provider != "letta" {
            return Err(invalid(format!(
                "Unknown archival provider: '{}'. Must be letta.",
                archival.provider
            )));
        }
        if archival.agent_name.trim().is_empty() {
            return Err(invalid("archival.agent_name must not be empty"));
        }
    }

    globset::Glob::new(&config.corpus.pattern)
        .with_context(|| format!("Invalid corpus.pattern: {}", config.corpus.pattern))
        .map_err(|e| invalid(format!("{:#}", e)))?;

    config.corpus.dir = expand_home(&config.corpus.dir)?;
    config.corpus.root_file = config
        .corpus
        .root_file
        .as_deref()
        .map(expand_home)
        .transpose()?;
    config.state.path = expand_home(&config.state.path)?;
    config.vector.path = expand_home(&config.vector.path)?;
    config.facts.path = expand_home(&config.facts.path)?;

    Ok(config)
}
