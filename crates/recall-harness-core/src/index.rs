//! Incremental indexing of documents into a [`VectorStore`].
//!
//! A pass over one file is skipped when its fingerprint matches the
//! [`IndexState`] record. Otherwise the pass runs, in order:
//!
//! 1. forget the stale record and persist the state,
//! 2. delete all of the file's chunks from the vector store,
//! 3. split the current content with [`split_with`],
//! 4. insert the new chunks tagged with file, chunk index, and timestamp,
//! 5. record the new fingerprint and persist the state.
//!
//! Step 1 means an interruption anywhere in 2–4 leaves the file without a
//! record, so the next non-forced pass re-indexes it instead of trusting
//! a fingerprint whose chunks were never written.
//!
//! Indexing assumes a single writer per file identity. Concurrent recall
//! queries may observe a file's old chunks, no chunks, or the new chunks.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunk::{split_with, ChunkParams};
use crate::error::RecallError;
use crate::fingerprint::fingerprint;
use crate::models::IndexedChunk;
use crate::state::IndexState;
use crate::store::{ArchivalMemory, StateStore, VectorStore};

/// Characters of file content mirrored into archival memory per file.
pub const ARCHIVAL_SUMMARY_CHARS: usize = 2000;

/// Source of document bytes by file identity.
pub trait DocumentReader: Send + Sync {
    fn read(&self, file: &str) -> Result<Vec<u8>>;
}

/// A per-file failure recorded in an [`IndexReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexError {
    pub file: String,
    pub message: String,
}

/// Aggregate outcome of a batch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Files whose chunks were rewritten.
    pub files_indexed: usize,
    /// Files skipped because their fingerprint was current.
    pub files_skipped: usize,
    pub chunks_written: usize,
    pub errors: Vec<IndexError>,
}

/// Outcome of indexing a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Unchanged,
    Indexed { chunks: usize },
}

impl FileOutcome {
    pub fn chunks(&self) -> usize {
        match self {
            FileOutcome::Unchanged => 0,
            FileOutcome::Indexed { chunks } => *chunks,
        }
    }
}

pub struct Indexer {
    vector: Arc<dyn VectorStore>,
    states: Arc<dyn StateStore>,
    archival: Option<Arc<dyn ArchivalMemory>>,
    params: ChunkParams,
}

impl Indexer {
    pub fn new(
        vector: Arc<dyn VectorStore>,
        states: Arc<dyn StateStore>,
        params: ChunkParams,
    ) -> Self {
        Self {
            vector,
            states,
            archival: None,
            params,
        }
    }

    /// Also push a short summary of every re-indexed file into `archival`.
    pub fn with_archival_mirror(mut self, archival: Arc<dyn ArchivalMemory>) -> Self {
        self.archival = Some(archival);
        self
    }

    /// Index one file against the persisted state. Returns chunks written.
    pub async fn index_file(
        &self,
        reader: &dyn DocumentReader,
        file: &str,
        force: bool,
    ) -> Result<usize> {
        let mut state = self.states.load()?;
        let outcome = match reader.read(file) {
            Ok(bytes) => self.index_document(&mut state, file, &bytes, force).await,
            Err(e) => Err(e),
        };
        outcome.map(|o| o.chunks()).map_err(|e| {
            RecallError::IndexFile {
                file: file.to_string(),
                message: format!("{:#}", e),
            }
            .into()
        })
    }

    /// Index `files` in the given order. Never fails as a whole: per-file
    /// errors are collected in the report and the batch carries on.
    ///
    /// `lastFullIndexTimestamp` is updated once the batch completes.
    pub async fn index_files(
        &self,
        reader: &dyn DocumentReader,
        files: &[String],
        force: bool,
    ) -> IndexReport {
        let mut report = IndexReport::default();
        let mut state = match self.states.load() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "index state unreadable, re-indexing from empty state");
                report.errors.push(IndexError {
                    file: "index state".to_string(),
                    message: format!("{:#}", e),
                });
                IndexState::new()
            }
        };

        for file in files {
            let result = match reader.read(file) {
                Ok(bytes) => self.index_document(&mut state, file, &bytes, force).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(FileOutcome::Unchanged) => report.files_skipped += 1,
                Ok(FileOutcome::Indexed { chunks }) => {
                    report.files_indexed += 1;
                    report.chunks_written += chunks;
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    warn!(file = %file, error = %message, "file failed to index");
                    report.errors.push(IndexError {
                        file: file.clone(),
                        message,
                    });
                }
            }
        }

        state.mark_full_index(Utc::now());
        if let Err(e) = self.states.save(&state) {
            report.errors.push(IndexError {
                file: "index state".to_string(),
                message: format!("{:#}", e),
            });
        }

        info!(
            indexed = report.files_indexed,
            skipped = report.files_skipped,
            chunks = report.chunks_written,
            errors = report.errors.len(),
            "index pass complete"
        );
        report
    }

    /// Index one document's bytes, mutating and persisting `state`.
    pub async fn index_document(
        &self,
        state: &mut IndexState,
        file: &str,
        bytes: &[u8],
        force: bool,
    ) -> Result<FileOutcome> {
        let fp = fingerprint(bytes);
        if !force && state.is_current(file, &fp) {
            debug!(file = %file, "unchanged, skipping");
            return Ok(FileOutcome::Unchanged);
        }

        let text = std::str::from_utf8(bytes).context("file is not valid UTF-8")?;

        if state.forget(file).is_some() {
            self.states.save(state)?;
        }

        let removed = self.vector.delete_by_source_file(file).await?;

        let now = Utc::now();
        let chunks: Vec<IndexedChunk> = split_with(text, &self.params)
            .into_iter()
            .enumerate()
            .map(|(i, c)| IndexedChunk {
                id: Uuid::new_v4().to_string(),
                source_file: file.to_string(),
                chunk_index: i as i64,
                header_path: c.header_label(),
                text: c.text,
                indexed_at: now,
            })
            .collect();
        self.vector.upsert(&chunks).await?;

        if let Some(archival) = &self.archival {
            if let Err(e) = archival.insert(&archival_summary(file, text)).await {
                warn!(file = %file, error = %e, "archival mirror failed");
            }
        }

        state.record(file, &fp);
        self.states.save(state)?;

        info!(file = %file, removed, chunks = chunks.len(), "indexed");
        Ok(FileOutcome::Indexed {
            chunks: chunks.len(),
        })
    }
}

fn archival_summary(file: &str, text: &str) -> String {
    let name = Path::new(file)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.to_string());
    let head: String = text.chars().take(ARCHIVAL_SUMMARY_CHARS).collect();
    format!("File: {}\n\n{}", name, head)
}
