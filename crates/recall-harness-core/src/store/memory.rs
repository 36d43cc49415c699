//! In-memory backend ports for tests and ephemeral deployments.
//!
//! Uses `Vec` behind `std::sync::RwLock`. Similarity is plain term
//! overlap between the query and the stored text: a hit's distance is the
//! fraction of query terms it does not contain, and texts sharing no term
//! with the query are not returned.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::models::{
    ArchivalPassage, FactAck, FactHit, FactInput, FactRecord, IndexedChunk, VectorHit,
};
use crate::state::IndexState;

use super::{ArchivalMemory, FactMemory, StateStore, VectorStore};

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Fraction of `query` terms present in `text`, or `None` if none are.
fn overlap(query: &BTreeSet<String>, text: &str) -> Option<f64> {
    if query.is_empty() {
        return None;
    }
    let have = terms(text);
    let matched = query.iter().filter(|t| have.contains(*t)).count();
    if matched == 0 {
        None
    } else {
        Some(matched as f64 / query.len() as f64)
    }
}

/// In-memory [`VectorStore`].
#[derive(Default)]
pub struct InMemoryVectorStore {
    chunks: RwLock<Vec<IndexedChunk>>,
    deletes: AtomicUsize,
    upserts: AtomicUsize,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `delete_by_source_file` calls that removed at least one chunk.
    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Number of non-empty `upsert` calls.
    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn chunks_for(&self, source_file: &str) -> Result<Vec<IndexedChunk>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        let mut out: Vec<IndexedChunk> = chunks
            .iter()
            .filter(|c| c.source_file == source_file)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.chunk_index);
        Ok(out)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut stored = self.chunks.write().map_err(poisoned)?;
        for chunk in chunks {
            stored.retain(|c| c.id != chunk.id);
            stored.push(chunk.clone());
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_by_source_file(&self, source_file: &str) -> Result<usize> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        let before = stored.len();
        stored.retain(|c| c.source_file != source_file);
        let removed = before - stored.len();
        if removed > 0 {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }

    async fn query(&self, text: &str, limit: usize) -> Result<Vec<VectorHit>> {
        let query = terms(text);
        let stored = self.chunks.read().map_err(poisoned)?;
        let mut scored: Vec<(&IndexedChunk, f64)> = stored
            .iter()
            .filter_map(|c| overlap(&query, &c.text).map(|o| (c, 1.0 - o)))
            .collect();
        scored.sort_by(|(a, da), (b, db)| {
            da.partial_cmp(db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.indexed_at.cmp(&a.indexed_at))
        });
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(c, distance)| VectorHit {
                text: c.text.clone(),
                source_file: c.source_file.clone(),
                header_path: c.header_path.clone(),
                distance,
            })
            .collect())
    }

    async fn count(&self, source_file: Option<&str>) -> Result<usize> {
        let stored = self.chunks.read().map_err(poisoned)?;
        Ok(match source_file {
            Some(file) => stored.iter().filter(|c| c.source_file == file).count(),
            None => stored.len(),
        })
    }
}

/// In-memory [`FactMemory`]. Confidence is the query-term overlap ratio.
#[derive(Default)]
pub struct InMemoryFactMemory {
    facts: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryFactMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FactMemory for InMemoryFactMemory {
    async fn add(&self, input: FactInput, subject: &str) -> Result<FactAck> {
        let texts: Vec<String> = input
            .into_messages()
            .into_iter()
            .map(|m| m.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let added = texts.len();
        self.facts
            .write()
            .map_err(poisoned)?
            .entry(subject.to_string())
            .or_default()
            .extend(texts);
        Ok(FactAck {
            backend: "memory".to_string(),
            detail: json!({ "added": added }),
        })
    }

    async fn search(&self, text: &str, subject: &str, limit: usize) -> Result<Vec<FactHit>> {
        let query = terms(text);
        let facts = self.facts.read().map_err(poisoned)?;
        let mut hits: Vec<FactHit> = facts
            .get(subject)
            .map(|list| {
                list.iter()
                    .filter_map(|f| {
                        overlap(&query, f).map(|o| FactHit {
                            text: f.clone(),
                            confidence: Some(o),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        hits.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn get_all(&self, subject: &str) -> Result<Vec<FactRecord>> {
        let facts = self.facts.read().map_err(poisoned)?;
        Ok(facts
            .get(subject)
            .map(|list| list.iter().map(|t| FactRecord { text: t.clone() }).collect())
            .unwrap_or_default())
    }
}

/// In-memory [`ArchivalMemory`].
#[derive(Default)]
pub struct InMemoryArchival {
    passages: RwLock<Vec<String>>,
}

impl InMemoryArchival {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.passages.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArchivalMemory for InMemoryArchival {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ArchivalPassage>> {
        let query = terms(query);
        let passages = self.passages.read().map_err(poisoned)?;
        Ok(passages
            .iter()
            .filter(|p| overlap(&query, p).is_some())
            .take(limit)
            .map(|p| ArchivalPassage { text: p.clone() })
            .collect())
    }

    async fn insert(&self, text: &str) -> Result<()> {
        self.passages
            .write()
            .map_err(poisoned)?
            .push(text.to_string());
        Ok(())
    }
}

/// In-memory [`StateStore`] that counts saves.
#[derive(Default)]
pub struct InMemoryStateStore {
    state: RwLock<IndexState>,
    saves: AtomicUsize,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self) -> Result<IndexState> {
        Ok(self.state.read().map_err(poisoned)?.clone())
    }

    fn save(&self, state: &IndexState) -> Result<()> {
        *self.state.write().map_err(poisoned)? = state.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn chunk(id: &str, file: &str, index: i64, text: &str, age_secs: i64) -> IndexedChunk {
        IndexedChunk {
            id: id.to_string(),
            source_file: file.to_string(),
            chunk_index: index,
            header_path: "Notes".to_string(),
            text: text.to_string(),
            indexed_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn query_orders_by_distance_then_recency() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(&[
                chunk("a", "/a.md", 0, "rust cargo crates", 100),
                chunk("b", "/b.md", 0, "rust cargo", 10),
                chunk("c", "/c.md", 0, "rust cargo", 50),
                chunk("d", "/d.md", 0, "python", 0),
            ])
            .await
            .unwrap();

        let hits = store.query("rust cargo crates", 10).await.unwrap();
        let files: Vec<&str> = hits.iter().map(|h| h.source_file.as_str()).collect();
        assert_eq!(files, vec!["/a.md", "/b.md", "/c.md"]);
        assert_eq!(hits[0].distance, 0.0);
        assert!(hits.iter().all(|h| h.distance >= 0.0));
    }

    #[tokio::test]
    async fn delete_by_source_file_scopes_to_file() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(&[
                chunk("a0", "/a.md", 0, "one", 0),
                chunk("a1", "/a.md", 1, "two", 0),
                chunk("b0", "/b.md", 0, "three", 0),
            ])
            .await
            .unwrap();
        assert_eq!(store.delete_by_source_file("/a.md").await.unwrap(), 2);
        assert_eq!(store.count(None).await.unwrap(), 1);
        assert_eq!(store.count(Some("/b.md")).await.unwrap(), 1);
        assert_eq!(store.delete_by_source_file("/a.md").await.unwrap(), 0);
        assert_eq!(store.delete_calls(), 1);
    }

    #[tokio::test]
    async fn facts_scoped_by_subject() {
        let facts = InMemoryFactMemory::new();
        facts
            .add(FactInput::Text("Jack prefers green tea".into()), "atlas")
            .await
            .unwrap();
        facts
            .add(FactInput::Text("Someone else likes tea".into()), "other")
            .await
            .unwrap();

        let hits = facts.search("tea preference", "atlas", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].confidence, Some(0.5));
        assert_eq!(facts.get_all("atlas").await.unwrap().len(), 1);
        assert!(facts.get_all("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn state_store_replaces_and_counts() {
        let store = InMemoryStateStore::new();
        assert!(store.load().unwrap().files.is_empty());
        let mut state = IndexState::new();
        state.record("/a.md", "ff");
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);
        assert_eq!(store.save_count(), 1);
    }
}
