//! The [`Harness`] facade: one configured set of backends behind the
//! query surface the CLI exposes.
//!
//! | Operation | Backed by |
//! |-----------|-----------|
//! | [`Harness::recall`] | [`RecallEngine::recall`] |
//! | [`Harness::recall_raw`] | [`RecallEngine::recall_raw`] |
//! | [`Harness::index_all`] | [`collect_files`] + [`Indexer::index_files`] |
//! | [`Harness::add_fact`] | [`FactMemory::add`] |
//! | [`Harness::stats`] | store counts, archival core memory, the persisted [`IndexState`] |
//!
//! Construction is the only fallible step that aborts: configuration
//! errors (unknown providers, missing credentials) surface from
//! [`Harness::open`] before any corpus or backend I/O. An unreachable
//! archival server is not a configuration error; the harness runs with
//! archival absent.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use recall_harness_core::error::RecallError;
use recall_harness_core::index::{IndexError, IndexReport, Indexer};
use recall_harness_core::models::{FactAck, FactInput};
use recall_harness_core::recall::{Archival, RawRecall, RecallEngine, RecallResponse};
use recall_harness_core::state::IndexState;
use recall_harness_core::store::memory::{InMemoryFactMemory, InMemoryVectorStore};
use recall_harness_core::store::{FactMemory, StateStore, VectorStore};

use crate::config::Config;
use crate::corpus::{collect_files, FsReader};
use crate::letta::LettaArchival;
use crate::mem0::Mem0FactMemory;
use crate::sqlite_store::{SqliteFactMemory, SqliteVectorStore};
use crate::state_file::JsonStateFile;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub chunk_count: usize,
    pub fact_count: usize,
    pub archival_available: bool,
    /// Archival core memory blocks, when the backend exposes them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archival_core_memory: Option<Value>,
    pub index_state: IndexState,
}

pub struct Harness {
    config: Config,
    vector: Arc<dyn VectorStore>,
    facts: Arc<dyn FactMemory>,
    archival: Archival,
    states: Arc<dyn StateStore>,
    engine: RecallEngine,
    indexer: Indexer,
}

impl Harness {
    /// Build every configured backend.
    pub async fn open(config: Config) -> Result<Self> {
        let facts: Arc<dyn FactMemory> = match config.facts.provider.as_str() {
            "mem0" => Arc::new(Mem0FactMemory::from_config(&config.facts)?),
            "sqlite" => Arc::new(SqliteFactMemory::open(&config.facts.path).await?),
            "memory" => Arc::new(InMemoryFactMemory::new()),
            other => {
                return Err(
                    RecallError::config(format!("Unknown facts provider: '{}'", other)).into(),
                )
            }
        };

        let vector: Arc<dyn VectorStore> = match config.vector.provider.as_str() {
            "sqlite" => Arc::new(SqliteVectorStore::open(&config.vector.path).await?),
            "memory" => Arc::new(InMemoryVectorStore::new()),
            other => {
                return Err(
                    RecallError::config(format!("Unknown vector provider: '{}'", other)).into(),
                )
            }
        };

        let archival = match &config.archival {
            None => Archival::absent("not configured"),
            Some(archival_config) => match LettaArchival::connect(archival_config).await {
                Ok(letta) => Archival::Available(Arc::new(letta)),
                Err(e) => {
                    warn!(error = %e, "archival memory unavailable, continuing without it");
                    Archival::absent(format!("{:#}", e))
                }
            },
        };

        let states: Arc<dyn StateStore> = Arc::new(JsonStateFile::new(config.state.path.clone()));

        Ok(Self::from_parts(config, vector, facts, archival, states))
    }

    /// Assemble a harness from already-built backends.
    pub fn from_parts(
        config: Config,
        vector: Arc<dyn VectorStore>,
        facts: Arc<dyn FactMemory>,
        archival: Archival,
        states: Arc<dyn StateStore>,
    ) -> Self {
        let engine = RecallEngine::new(
            vector.clone(),
            facts.clone(),
            archival.clone(),
            config.recall_params(),
        );

        let mut indexer = Indexer::new(vector.clone(), states.clone(), config.chunking.params());
        let mirror = config.archival.as_ref().is_some_and(|a| a.mirror_on_index);
        if let (true, Some(handle)) = (mirror, archival.handle()) {
            indexer = indexer.with_archival_mirror(handle.clone());
        }

        Self {
            config,
            vector,
            facts,
            archival,
            states,
            engine,
            indexer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn archival(&self) -> &Archival {
        &self.archival
    }

    fn limit(&self, limit: Option<usize>) -> usize {
        limit.unwrap_or(self.config.recall.limit)
    }

    pub async fn recall(&self, query: &str, limit: Option<usize>) -> RecallResponse {
        self.engine.recall(query, self.limit(limit)).await
    }

    pub async fn recall_raw(&self, query: &str, limit: Option<usize>) -> RawRecall {
        self.engine.recall_raw(query, self.limit(limit)).await
    }

    /// Index the root file and every matching directory file.
    pub async fn index_all(&self, force: bool) -> IndexReport {
        let scan = match collect_files(&self.config.corpus) {
            Ok(scan) => scan,
            Err(e) => {
                warn!(error = %e, "corpus scan failed");
                return IndexReport {
                    errors: vec![IndexError {
                        file: self.config.corpus.dir.display().to_string(),
                        message: format!("{:#}", e),
                    }],
                    ..IndexReport::default()
                };
            }
        };
        info!(files = scan.files.len(), force, "indexing corpus");
        let mut report = self.indexer.index_files(&FsReader, &scan.files, force).await;
        report.errors.splice(0..0, scan.errors);
        report
    }

    /// Index a single file by path.
    pub async fn index_file(&self, file: &str, force: bool) -> Result<usize> {
        self.indexer.index_file(&FsReader, file, force).await
    }

    pub async fn add_fact(&self, text: &str) -> Result<FactAck> {
        if text.trim().is_empty() {
            bail!("fact text is empty");
        }
        self.facts
            .add(FactInput::Text(text.to_string()), &self.config.facts.subject)
            .await
    }

    pub async fn stats(&self) -> Result<Stats> {
        Ok(Stats {
            chunk_count: self.vector.count(None).await?,
            fact_count: self.facts.get_all(&self.config.facts.subject).await?.len(),
            archival_available: self.archival.is_available(),
            archival_core_memory: self.core_memory().await,
            index_state: self.states.load()?,
        })
    }

    async fn core_memory(&self) -> Option<Value> {
        let archival = self.archival.handle()?;
        match archival.core_memory().await {
            Ok(memory) => memory,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "archival core memory unavailable");
                None
            }
        }
    }
}
