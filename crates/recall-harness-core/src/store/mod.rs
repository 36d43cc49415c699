//! Backend ports for Recall Harness.
//!
//! The recall pipeline and the indexer depend only on these traits. Each
//! role is a separate trait so a deployment can mix backends freely (an
//! SQLite vector store with a hosted fact memory, say) and so the optional
//! archival role can be modelled explicitly as
//! [`Archival`](crate::recall::Archival).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Trait | Role |
//! |-------|------|
//! | [`VectorStore`] | Similarity search over indexed document chunks |
//! | [`FactMemory`] | Auto-extracted facts scoped to a subject |
//! | [`ArchivalMemory`] | Optional curated long-term passages |
//! | [`StateStore`] | Load/save of the [`IndexState`] |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{
    ArchivalPassage, FactAck, FactHit, FactInput, FactRecord, IndexedChunk, VectorHit,
};
use crate::state::IndexState;

/// Similarity search over chunked documents.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert chunks. Callers remove a file's previous chunks first.
    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()>;

    /// Delete every chunk attributed to `source_file`, returning how many.
    async fn delete_by_source_file(&self, source_file: &str) -> Result<usize>;

    /// Return up to `limit` hits, most similar first.
    ///
    /// Equal distances are ordered newest `indexed_at` first.
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<VectorHit>>;

    /// Number of stored chunks, optionally restricted to one source file.
    async fn count(&self, source_file: Option<&str>) -> Result<usize>;
}

/// Auto-extraction fact memory.
#[async_trait]
pub trait FactMemory: Send + Sync {
    async fn add(&self, input: FactInput, subject: &str) -> Result<FactAck>;

    async fn search(&self, text: &str, subject: &str, limit: usize) -> Result<Vec<FactHit>>;

    async fn get_all(&self, subject: &str) -> Result<Vec<FactRecord>>;
}

/// Hierarchical archival memory. May be absent in a deployment.
#[async_trait]
pub trait ArchivalMemory: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ArchivalPassage>>;

    /// Store a passage. Used to mirror indexed files into archival.
    async fn insert(&self, text: &str) -> Result<()>;

    /// Snapshot of the backend's always-in-context memory, if it keeps one.
    async fn core_memory(&self) -> Result<Option<Value>> {
        Ok(None)
    }
}

/// Persistence for [`IndexState`].
///
/// `save` must replace the previous state atomically: after an
/// interruption, `load` returns either the old or the new state in full.
pub trait StateStore: Send + Sync {
    /// Load the persisted state, or an empty state if none exists yet.
    fn load(&self) -> Result<IndexState>;

    fn save(&self, state: &IndexState) -> Result<()>;
}
