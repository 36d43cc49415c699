//! Multi-source recall: fan-out, normalization, merge, dedup, and ranking.
//!
//! # Pipeline
//!
//! 1. **Fan-out**: query the vector store, the fact memory, and (when
//!    available) the archival memory concurrently, each for
//!    `limit × over_fetch` hits so deduplication losses do not starve the
//!    final list.
//! 2. **Normalize**: project each backend's hits into a
//!    [`NormalizedResult`] with a `[0, 1]` higher-is-better score:
//!    - vector: `1 − min(distance, 1)`, text truncated for display,
//!    - facts: backend confidence, or [`DEFAULT_FACT_SCORE`] when unset,
//!    - archival: the fixed [`ARCHIVAL_SCORE`].
//! 3. **Merge**: concatenate in backend order (vector, facts, archival).
//! 4. **Dedup**: stable-sort by score descending, then keep the first
//!    result for each fingerprint of the text's first
//!    `dedup_prefix_chars` characters.
//! 5. **Truncate** to `limit`.
//!
//! A failing or absent backend contributes nothing and is reported as a
//! [`BackendDiagnostic`]; it never aborts the query.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::fingerprint::prefix_fingerprint;
use crate::models::{ArchivalPassage, FactHit, NormalizedResult, RankedResult, VectorHit};
use crate::store::{ArchivalMemory, FactMemory, VectorStore};

/// Score for a fact whose backend reports no confidence: moderately relevant.
pub const DEFAULT_FACT_SCORE: f64 = 0.5;
/// Score for every archival passage. Archival content is treated as curated,
/// so it ranks just above an unscored fact.
pub const ARCHIVAL_SCORE: f64 = 0.7;
pub const OVER_FETCH_FACTOR: usize = 2;
pub const MAX_TEXT_CHARS: usize = 500;
pub const DEDUP_PREFIX_CHARS: usize = 100;

/// Backend roles, in merge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Vector,
    Facts,
    Archival,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Vector => "vector",
            BackendKind::Facts => "facts",
            BackendKind::Archival => "archival",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// Not configured or not reachable; no call was made.
    Unavailable,
    /// The call was made and returned an error.
    Failed,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagnosticKind::Unavailable => "unavailable",
            DiagnosticKind::Failed => "failed",
        })
    }
}

/// Why one backend contributed no results to a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendDiagnostic {
    pub backend: BackendKind,
    pub kind: DiagnosticKind,
    pub message: String,
}

/// The optional archival role, made explicit.
#[derive(Clone)]
pub enum Archival {
    Available(Arc<dyn ArchivalMemory>),
    Absent { reason: String },
}

impl Archival {
    pub fn absent(reason: impl Into<String>) -> Self {
        Archival::Absent {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Archival::Available(_))
    }

    pub fn handle(&self) -> Option<&Arc<dyn ArchivalMemory>> {
        match self {
            Archival::Available(a) => Some(a),
            Archival::Absent { .. } => None,
        }
    }
}

/// Ranking policy knobs. Defaults are the module constants.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallParams {
    /// Fact-memory subject (user) to scope fact searches to.
    pub subject: String,
    pub over_fetch: usize,
    pub max_text_chars: usize,
    pub dedup_prefix_chars: usize,
    pub fact_default_score: f64,
    pub archival_score: f64,
}

impl Default for RecallParams {
    fn default() -> Self {
        Self {
            subject: "default".to_string(),
            over_fetch: OVER_FETCH_FACTOR,
            max_text_chars: MAX_TEXT_CHARS,
            dedup_prefix_chars: DEDUP_PREFIX_CHARS,
            fact_default_score: DEFAULT_FACT_SCORE,
            archival_score: ARCHIVAL_SCORE,
        }
    }
}

/// Merged, ranked results plus per-backend diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct RecallResponse {
    pub query: String,
    pub results: Vec<RankedResult>,
    pub diagnostics: Vec<BackendDiagnostic>,
}

/// Per-backend normalized results, unmerged.
#[derive(Debug, Clone, Serialize)]
pub struct RawRecall {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub vector: Vec<NormalizedResult>,
    pub facts: Vec<NormalizedResult>,
    pub archival: Vec<NormalizedResult>,
    pub diagnostics: Vec<BackendDiagnostic>,
}

impl RawRecall {
    /// All results in merge order.
    pub fn merged(&self) -> Vec<NormalizedResult> {
        self.vector
            .iter()
            .chain(&self.facts)
            .chain(&self.archival)
            .cloned()
            .collect()
    }
}

pub struct RecallEngine {
    vector: Arc<dyn VectorStore>,
    facts: Arc<dyn FactMemory>,
    archival: Archival,
    params: RecallParams,
}

impl RecallEngine {
    pub fn new(
        vector: Arc<dyn VectorStore>,
        facts: Arc<dyn FactMemory>,
        archival: Archival,
        params: RecallParams,
    ) -> Self {
        Self {
            vector,
            facts,
            archival,
            params,
        }
    }

    pub fn params(&self) -> &RecallParams {
        &self.params
    }

    pub fn archival(&self) -> &Archival {
        &self.archival
    }

    /// Search every backend and return one deduplicated, ranked list of at
    /// most `limit` results.
    pub async fn recall(&self, query: &str, limit: usize) -> RecallResponse {
        if query.trim().is_empty() || limit == 0 {
            return RecallResponse {
                query: query.to_string(),
                results: Vec::new(),
                diagnostics: Vec::new(),
            };
        }

        let raw = self
            .fan_out(query, limit.saturating_mul(self.params.over_fetch.max(1)))
            .await;
        let results = rank(raw.merged(), limit, self.params.dedup_prefix_chars);
        debug!(query = %query, results = results.len(), "recall");

        RecallResponse {
            query: raw.query,
            results,
            diagnostics: raw.diagnostics,
        }
    }

    /// Search every backend for `limit` hits each, without merging.
    pub async fn recall_raw(&self, query: &str, limit: usize) -> RawRecall {
        if query.trim().is_empty() || limit == 0 {
            return RawRecall {
                query: query.to_string(),
                timestamp: Utc::now(),
                vector: Vec::new(),
                facts: Vec::new(),
                archival: Vec::new(),
                diagnostics: Vec::new(),
            };
        }
        self.fan_out(query, limit).await
    }

    async fn fan_out(&self, query: &str, per_backend: usize) -> RawRecall {
        let p = &self.params;

        let vector = async {
            self.vector
                .query(query, per_backend)
                .await
                .map(|hits| {
                    hits.into_iter()
                        .map(|h| normalize_vector_hit(h, p.max_text_chars))
                        .collect::<Vec<_>>()
                })
                .map_err(|e| failed(BackendKind::Vector, e))
        };

        let facts = async {
            self.facts
                .search(query, &p.subject, per_backend)
                .await
                .map(|hits| {
                    hits.into_iter()
                        .map(|h| normalize_fact(h, p.fact_default_score))
                        .collect::<Vec<_>>()
                })
                .map_err(|e| failed(BackendKind::Facts, e))
        };

        let archival = async {
            match &self.archival {
                Archival::Available(a) => a
                    .search(query, per_backend)
                    .await
                    .map(|hits| {
                        hits.into_iter()
                            .map(|h| normalize_archival(h, p.archival_score, p.max_text_chars))
                            .collect::<Vec<_>>()
                    })
                    .map_err(|e| failed(BackendKind::Archival, e)),
                Archival::Absent { reason } => Err(BackendDiagnostic {
                    backend: BackendKind::Archival,
                    kind: DiagnosticKind::Unavailable,
                    message: reason.clone(),
                }),
            }
        };

        let (vector, facts, archival) = futures::join!(vector, facts, archival);

        let mut diagnostics = Vec::new();
        let mut take = |r: Result<Vec<NormalizedResult>, BackendDiagnostic>| match r {
            Ok(v) => v,
            Err(d) => {
                diagnostics.push(d);
                Vec::new()
            }
        };
        let vector = take(vector);
        let facts = take(facts);
        let archival = take(archival);

        RawRecall {
            query: query.to_string(),
            timestamp: Utc::now(),
            vector,
            facts,
            archival,
            diagnostics,
        }
    }
}

fn failed(backend: BackendKind, err: anyhow::Error) -> BackendDiagnostic {
    warn!(backend = %backend, error = %err, "backend query failed");
    BackendDiagnostic {
        backend,
        kind: DiagnosticKind::Failed,
        message: format!("{:#}", err),
    }
}

/// Clamp to `[0, 1]`; anything non-finite counts as no signal.
fn unit(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => text[..i].to_string(),
        None => text,
    }
}

pub fn normalize_vector_hit(hit: VectorHit, max_chars: usize) -> NormalizedResult {
    let distance = if hit.distance.is_finite() {
        hit.distance.max(0.0)
    } else {
        1.0
    };
    let name = Path::new(&hit.source_file)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| hit.source_file.clone());

    let mut auxiliary = BTreeMap::new();
    auxiliary.insert("headerPath".to_string(), hit.header_path);
    auxiliary.insert("sourceFile".to_string(), hit.source_file);

    NormalizedResult {
        text: truncate_chars(hit.text, max_chars),
        source: format!("vector:{}", name),
        score: 1.0 - distance.min(1.0),
        auxiliary,
    }
}

pub fn normalize_fact(hit: FactHit, default_score: f64) -> NormalizedResult {
    NormalizedResult {
        text: hit.text,
        source: BackendKind::Facts.to_string(),
        score: unit(hit.confidence.unwrap_or(default_score)),
        auxiliary: BTreeMap::new(),
    }
}

pub fn normalize_archival(
    passage: ArchivalPassage,
    score: f64,
    max_chars: usize,
) -> NormalizedResult {
    NormalizedResult {
        text: truncate_chars(passage.text, max_chars),
        source: BackendKind::Archival.to_string(),
        score: unit(score),
        auxiliary: BTreeMap::new(),
    }
}

/// Sort by score (stable, descending), drop later results whose text
/// prefix fingerprint was already seen, and keep the first `limit`.
pub fn rank(
    mut results: Vec<NormalizedResult>,
    limit: usize,
    prefix_chars: usize,
) -> Vec<RankedResult> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter_map(|result| {
            let fingerprint = prefix_fingerprint(&result.text, prefix_chars);
            seen.insert(fingerprint.clone())
                .then_some(RankedResult { result, fingerprint })
        })
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::Utc;

    use crate::models::{FactInput, FactRecord, IndexedChunk};
    use crate::store::memory::{InMemoryArchival, InMemoryFactMemory, InMemoryVectorStore};

    fn result(text: &str, source: &str, score: f64) -> NormalizedResult {
        NormalizedResult {
            text: text.to_string(),
            source: source.to_string(),
            score,
            auxiliary: BTreeMap::new(),
        }
    }

    struct DownArchival;

    #[async_trait]
    impl ArchivalMemory for DownArchival {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<ArchivalPassage>> {
            bail!("connection refused")
        }
        async fn insert(&self, _text: &str) -> Result<()> {
            bail!("connection refused")
        }
    }

    struct DownFacts;

    #[async_trait]
    impl FactMemory for DownFacts {
        async fn add(&self, _input: FactInput, _subject: &str) -> Result<crate::models::FactAck> {
            bail!("quota exceeded")
        }
        async fn search(&self, _t: &str, _s: &str, _l: usize) -> Result<Vec<FactHit>> {
            bail!("quota exceeded")
        }
        async fn get_all(&self, _subject: &str) -> Result<Vec<FactRecord>> {
            bail!("quota exceeded")
        }
    }

    /// Returns a fixed hit list and records the limit it was asked for.
    struct FixedVector {
        hits: Vec<VectorHit>,
        asked: std::sync::Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl VectorStore for FixedVector {
        async fn upsert(&self, _chunks: &[IndexedChunk]) -> Result<()> {
            Ok(())
        }
        async fn delete_by_source_file(&self, _f: &str) -> Result<usize> {
            Ok(0)
        }
        async fn query(&self, _text: &str, limit: usize) -> Result<Vec<VectorHit>> {
            self.asked.lock().unwrap().push(limit);
            Ok(self.hits.iter().take(limit).cloned().collect())
        }
        async fn count(&self, _f: Option<&str>) -> Result<usize> {
            Ok(self.hits.len())
        }
    }

    fn hit(text: &str, file: &str, distance: f64) -> VectorHit {
        VectorHit {
            text: text.to_string(),
            source_file: file.to_string(),
            header_path: "Notes > Garden".to_string(),
            distance,
        }
    }

    async fn populated() -> (Arc<InMemoryVectorStore>, Arc<InMemoryFactMemory>) {
        let vector = Arc::new(InMemoryVectorStore::new());
        vector
            .upsert(&[IndexedChunk {
                id: "c0".into(),
                source_file: "/home/me/notes/garden.md".into(),
                chunk_index: 0,
                header_path: "Garden".into(),
                text: "tomatoes need staking in the greenhouse".into(),
                indexed_at: Utc::now(),
            }])
            .await
            .unwrap();
        let facts = Arc::new(InMemoryFactMemory::new());
        facts
            .add(FactInput::Text("Jack grows tomatoes every summer".into()), "atlas")
            .await
            .unwrap();
        (vector, facts)
    }

    fn params() -> RecallParams {
        RecallParams {
            subject: "atlas".into(),
            ..RecallParams::default()
        }
    }

    #[test]
    fn vector_score_from_distance() {
        assert_eq!(normalize_vector_hit(hit("t", "/a.md", 0.0), 500).score, 1.0);
        assert!((normalize_vector_hit(hit("t", "/a.md", 0.25), 500).score - 0.75).abs() < 1e-12);
        assert_eq!(normalize_vector_hit(hit("t", "/a.md", 1.7), 500).score, 0.0);
        assert_eq!(normalize_vector_hit(hit("t", "/a.md", f64::NAN), 500).score, 0.0);
    }

    #[test]
    fn vector_label_and_auxiliary() {
        let n = normalize_vector_hit(hit("t", "/home/me/notes/2026-10-01.md", 0.1), 500);
        assert_eq!(n.source, "vector:2026-10-01.md");
        assert_eq!(n.auxiliary["headerPath"], "Notes > Garden");
        assert_eq!(n.auxiliary["sourceFile"], "/home/me/notes/2026-10-01.md");
    }

    #[test]
    fn vector_text_truncated_by_chars() {
        let long = "ü".repeat(800);
        let n = normalize_vector_hit(hit(&long, "/a.md", 0.1), 500);
        assert_eq!(n.text.chars().count(), 500);
    }

    #[test]
    fn fact_score_defaults_when_unset() {
        let unset = normalize_fact(
            FactHit {
                text: "likes tea".into(),
                confidence: None,
            },
            DEFAULT_FACT_SCORE,
        );
        assert_eq!(unset.score, 0.5);
        assert_eq!(unset.source, "facts");

        let scored = normalize_fact(
            FactHit {
                text: "likes tea".into(),
                confidence: Some(0.91),
            },
            DEFAULT_FACT_SCORE,
        );
        assert_eq!(scored.score, 0.91);

        let over = normalize_fact(
            FactHit {
                text: "x".into(),
                confidence: Some(3.0),
            },
            DEFAULT_FACT_SCORE,
        );
        assert_eq!(over.score, 1.0);
    }

    #[test]
    fn archival_score_is_fixed() {
        let n = normalize_archival(
            ArchivalPassage {
                text: "curated".into(),
            },
            ARCHIVAL_SCORE,
            500,
        );
        assert_eq!(n.score, 0.7);
        assert_eq!(n.source, "archival");
    }

    #[test]
    fn dedup_keeps_higher_scored_duplicate() {
        let shared = "a".repeat(100);
        let results = vec![
            result(&format!("{}-from-facts", shared), "facts", 0.5),
            result(&format!("{}-from-vector", shared), "vector:a.md", 0.9),
        ];
        let ranked = rank(results, 10, 100);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].result.source, "vector:a.md");
    }

    #[test]
    fn exactly_limit_sorted_non_increasing() {
        let results: Vec<NormalizedResult> = (0..20)
            .map(|i| result(&format!("unique result {}", i), "facts", (i % 7) as f64 / 7.0))
            .collect();
        let ranked = rank(results, 5, 100);
        assert_eq!(ranked.len(), 5);
        for pair in ranked.windows(2) {
            assert!(pair[0].result.score >= pair[1].result.score);
        }
    }

    #[test]
    fn equal_scores_keep_first_seen() {
        let results = vec![
            result("first", "vector:a.md", 0.5),
            result("second", "facts", 0.5),
            result("third", "archival", 0.5),
        ];
        let ranked = rank(results, 10, 100);
        let texts: Vec<&str> = ranked.iter().map(|r| r.result.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn equal_score_duplicates_keep_earlier_backend() {
        let results = vec![
            result("same fact", "vector:a.md", 0.5),
            result("same fact", "facts", 0.5),
        ];
        let ranked = rank(results, 10, 100);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].result.source, "vector:a.md");
    }

    #[tokio::test]
    async fn merges_all_backends() {
        let (vector, facts) = populated().await;
        let archival = Arc::new(InMemoryArchival::new());
        archival.insert("tomatoes were planted in May").await.unwrap();

        let engine = RecallEngine::new(vector, facts, Archival::Available(archival), params());
        let response = engine.recall("tomatoes", 5).await;
        assert!(response.diagnostics.is_empty());
        let sources: Vec<&str> = response
            .results
            .iter()
            .map(|r| r.result.source.as_str())
            .collect();
        assert_eq!(sources, vec!["vector:garden.md", "facts", "archival"]);
    }

    #[tokio::test]
    async fn archival_failure_is_isolated() {
        let (vector, facts) = populated().await;
        let engine = RecallEngine::new(
            vector,
            facts,
            Archival::Available(Arc::new(DownArchival)),
            params(),
        );
        let response = engine.recall("tomatoes", 5).await;
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].backend, BackendKind::Archival);
        assert_eq!(response.diagnostics[0].kind, DiagnosticKind::Failed);
        assert!(response.diagnostics[0].message.contains("connection refused"));
    }

    #[tokio::test]
    async fn absent_archival_reported_unavailable() {
        let (vector, facts) = populated().await;
        let engine = RecallEngine::new(vector, facts, Archival::absent("not configured"), params());
        let response = engine.recall("tomatoes", 5).await;
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.diagnostics[0].kind, DiagnosticKind::Unavailable);
    }

    #[tokio::test]
    async fn all_backends_down_yields_empty_with_diagnostics() {
        let vector = Arc::new(FixedVector {
            hits: Vec::new(),
            asked: Default::default(),
        });
        let engine = RecallEngine::new(
            vector,
            Arc::new(DownFacts),
            Archival::Available(Arc::new(DownArchival)),
            params(),
        );
        let response = engine.recall("anything", 5).await;
        assert!(response.results.is_empty());
        assert_eq!(response.diagnostics.len(), 2);
    }

    #[tokio::test]
    async fn over_fetches_then_truncates() {
        let hits: Vec<VectorHit> = (0..30)
            .map(|i| hit(&format!("chunk number {}", i), "/a.md", i as f64 / 30.0))
            .collect();
        let vector = Arc::new(FixedVector {
            hits,
            asked: Default::default(),
        });
        let engine = RecallEngine::new(
            vector.clone(),
            Arc::new(InMemoryFactMemory::new()),
            Archival::absent("not configured"),
            params(),
        );
        let response = engine.recall("chunk", 4).await;
        assert_eq!(response.results.len(), 4);
        assert_eq!(*vector.asked.lock().unwrap(), vec![8]);
        assert_eq!(response.results[0].result.text, "chunk number 0");

        engine.recall_raw("chunk", 4).await;
        assert_eq!(*vector.asked.lock().unwrap(), vec![8, 4]);
    }

    #[tokio::test]
    async fn raw_recall_keeps_sources_apart() {
        let (vector, facts) = populated().await;
        let engine = RecallEngine::new(vector, facts, Archival::absent("not configured"), params());
        let raw = engine.recall_raw("tomatoes", 5).await;
        assert_eq!(raw.vector.len(), 1);
        assert_eq!(raw.facts.len(), 1);
        assert!(raw.archival.is_empty());
        assert_eq!(raw.merged().len(), 2);
    }

    #[tokio::test]
    async fn blank_query_short_circuits() {
        let (vector, facts) = populated().await;
        let engine = RecallEngine::new(vector, facts, Archival::absent("not configured"), params());
        let response = engine.recall("   ", 5).await;
        assert!(response.results.is_empty());
        assert!(response.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn blank_raw_recall_queries_nothing() {
        let vector = Arc::new(FixedVector {
            hits: vec![hit("tomatoes", "/n/a.md", 0.1)],
            asked: std::sync::Mutex::new(Vec::new()),
        });
        let engine = RecallEngine::new(
            vector.clone(),
            Arc::new(DownFacts),
            Archival::Available(Arc::new(DownArchival)),
            params(),
        );

        let raw = engine.recall_raw("  ", 5).await;
        assert!(raw.merged().is_empty());
        assert!(raw.diagnostics.is_empty());

        let raw = engine.recall_raw("tomatoes", 0).await;
        assert!(raw.merged().is_empty());
        assert!(vector.asked.lock().unwrap().is_empty());
    }
}
