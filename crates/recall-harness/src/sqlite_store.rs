//! SQLite-backed [`VectorStore`] and [`FactMemory`] implementations.
//!
//! Both use FTS5 keyword search. BM25 `rank` values are negative with
//! larger magnitude meaning a better match; the vector store maps them to
//! a distance with `1 / (1 + |rank|)` so `0.0` stays "most similar".

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use recall_harness_core::models::{
    FactAck, FactHit, FactInput, FactRecord, IndexedChunk, VectorHit,
};
use recall_harness_core::store::{FactMemory, VectorStore};

use crate::{db, migrate};

/// Quote every alphanumeric term and OR them together, so user text can
/// never be parsed as FTS5 query syntax. `None` when no term survives.
pub fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// BM25 rank to a non-negative distance.
pub fn rank_to_distance(rank: f64) -> f64 {
    if rank.is_finite() {
        1.0 / (1.0 + rank.abs())
    } else {
        1.0
    }
}

fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite implementation of [`VectorStore`] over `chunks` + `chunks_fts`.
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `path` and ensure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::migrate_vectors(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?")
                .bind(&chunk.id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO chunks (id, source_file, chunk_index, header_path, text, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    source_file = excluded.source_file,
                    chunk_index = excluded.chunk_index,
                    header_path = excluded.header_path,
                    text = excluded.text,
                    indexed_at = excluded.indexed_at
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source_file)
            .bind(chunk.chunk_index)
            .bind(&chunk.header_path)
            .bind(&chunk.text)
            .bind(timestamp(chunk.indexed_at))
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunks_fts (chunk_id, source_file, text) VALUES (?, ?, ?)")
                .bind(&chunk.id)
                .bind(&chunk.source_file)
                .bind(&chunk.text)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_source_file(&self, source_file: &str) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks_fts WHERE source_file = ?")
            .bind(source_file)
            .execute(&mut *tx)
            .await?;

        let removed = sqlx::query("DELETE FROM chunks WHERE source_file = ?")
            .bind(source_file)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed as usize)
    }

    async fn query(&self, text: &str, limit: usize) -> Result<Vec<VectorHit>> {
        let Some(fts) = fts_query(text) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT chunks.text, chunks.source_file, chunks.header_path, chunks_fts.rank AS rank
            FROM chunks_fts
            JOIN chunks ON chunks.id = chunks_fts.chunk_id
            WHERE chunks_fts MATCH ?
            ORDER BY chunks_fts.rank, chunks.indexed_at DESC
            LIMIT ?
            "#,
        )
        .bind(&fts)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        debug!(query = %fts, hits = rows.len(), "fts5 chunk search");

        Ok(rows
            .iter()
            .map(|row| VectorHit {
                text: row.get("text"),
                source_file: row.get("source_file"),
                header_path: row.get("header_path"),
                distance: rank_to_distance(row.get("rank")),
            })
            .collect())
    }

    async fn count(&self, source_file: Option<&str>) -> Result<usize> {
        let n: i64 = match source_file {
            Some(file) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE source_file = ?")
                    .bind(file)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(n as usize)
    }
}

/// SQLite implementation of [`FactMemory`] over `facts` + `facts_fts`.
///
/// Facts are stored verbatim, one per user or assistant turn. Search
/// reports no confidence.
pub struct SqliteFactMemory {
    pool: SqlitePool,
}

impl SqliteFactMemory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::migrate_facts(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl FactMemory for SqliteFactMemory {
    async fn add(&self, input: FactInput, subject: &str) -> Result<FactAck> {
        let now = timestamp(Utc::now());
        let mut ids = Vec::new();
        let mut tx = self.pool.begin().await?;

        for message in input.into_messages() {
            let text = message.content.trim();
            if text.is_empty() || !matches!(message.role.as_str(), "user" | "assistant") {
                continue;
            }
            let id = Uuid::new_v4().to_string();

            sqlx::query("INSERT INTO facts (id, subject, text, created_at) VALUES (?, ?, ?, ?)")
                .bind(&id)
                .bind(subject)
                .bind(text)
                .bind(&now)
                .execute(&mut *tx)
                .await?;

            sqlx::query("INSERT INTO facts_fts (fact_id, subject, text) VALUES (?, ?, ?)")
                .bind(&id)
                .bind(subject)
                .bind(text)
                .execute(&mut *tx)
                .await?;

            ids.push(id);
        }

        tx.commit().await?;
        Ok(FactAck {
            backend: "sqlite".to_string(),
            detail: json!({ "added": ids.len(), "ids": ids }),
        })
    }

    async fn search(&self, text: &str, subject: &str, limit: usize) -> Result<Vec<FactHit>> {
        let Some(fts) = fts_query(text) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT facts.text
            FROM facts_fts
            JOIN facts ON facts.id = facts_fts.fact_id
            WHERE facts_fts MATCH ? AND facts.subject = ?
            ORDER BY facts_fts.rank, facts.created_at DESC
            LIMIT ?
            "#,
        )
        .bind(&fts)
        .bind(subject)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| FactHit {
                text: row.get("text"),
                confidence: None,
            })
            .collect())
    }

    async fn get_all(&self, subject: &str) -> Result<Vec<FactRecord>> {
        let rows = sqlx::query("SELECT text FROM facts WHERE subject = ? ORDER BY created_at, id")
            .bind(subject)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| FactRecord {
                text: row.get("text"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_harness_core::models::Message;
    use tempfile::TempDir;

    fn chunk(id: &str, file: &str, index: i64, text: &str) -> IndexedChunk {
        IndexedChunk {
            id: id.to_string(),
            source_file: file.to_string(),
            chunk_index: index,
            header_path: "Garden".to_string(),
            text: text.to_string(),
            indexed_at: Utc::now(),
        }
    }

    #[test]
    fn fts_query_quotes_terms() {
        assert_eq!(
            fts_query("what's \"NEAR\" tomatoes?").as_deref(),
            Some("\"what\" OR \"s\" OR \"NEAR\" OR \"tomatoes\"")
        );
        assert_eq!(fts_query("  -- ** "), None);
    }

    #[test]
    fn rank_maps_to_unit_distance() {
        assert_eq!(rank_to_distance(0.0), 1.0);
        assert!((rank_to_distance(-3.0) - 0.25).abs() < 1e-12);
        assert!(rank_to_distance(-10.0) < rank_to_distance(-1.0));
    }

    #[tokio::test]
    async fn vector_store_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(&tmp.path().join("v.sqlite"))
            .await
            .unwrap();

        store
            .upsert(&[
                chunk("a0", "/notes/a.md", 0, "tomatoes need staking"),
                chunk("a1", "/notes/a.md", 1, "peppers like heat"),
                chunk("b0", "/notes/b.md", 0, "the tomatoes ripened early"),
            ])
            .await
            .unwrap();
        assert_eq!(store.count(None).await.unwrap(), 3);
        assert_eq!(store.count(Some("/notes/a.md")).await.unwrap(), 2);

        let hits = store.query("tomatoes", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.distance > 0.0 && h.distance <= 1.0));
        assert_eq!(hits[0].header_path, "Garden");

        assert_eq!(store.delete_by_source_file("/notes/a.md").await.unwrap(), 2);
        let hits = store.query("tomatoes", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_file, "/notes/b.md");
    }

    #[tokio::test]
    async fn query_with_fts_syntax_is_safe() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(&tmp.path().join("v.sqlite"))
            .await
            .unwrap();
        store
            .upsert(&[chunk("a0", "/a.md", 0, "deploy AND rollback")])
            .await
            .unwrap();
        let hits = store.query("AND (rollback* OR", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(store.query("***", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn facts_scoped_and_unscored() {
        let tmp = TempDir::new().unwrap();
        let facts = SqliteFactMemory::open(&tmp.path().join("f.sqlite"))
            .await
            .unwrap();

        let ack = facts
            .add(FactInput::Text("Jack prefers green tea".into()), "atlas")
            .await
            .unwrap();
        assert_eq!(ack.detail["added"], 1);
        facts
            .add(
                FactInput::Conversation(vec![
                    Message {
                        role: "system".into(),
                        content: "ignored".into(),
                    },
                    Message {
                        role: "assistant".into(),
                        content: "Noted: tea without sugar".into(),
                    },
                ]),
                "atlas",
            )
            .await
            .unwrap();
        facts
            .add(FactInput::Text("Other tea drinker".into()), "someone")
            .await
            .unwrap();

        let hits = facts.search("tea", "atlas", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.confidence.is_none()));
        assert_eq!(facts.get_all("atlas").await.unwrap().len(), 2);
        assert_eq!(facts.get_all("someone").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reopen_keeps_data() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/v.sqlite");
        {
            let store = SqliteVectorStore::open(&path).await.unwrap();
            store
                .upsert(&[chunk("a0", "/a.md", 0, "persisted")])
                .await
                .unwrap();
        }
        let store = SqliteVectorStore::open(&path).await.unwrap();
        assert_eq!(store.count(None).await.unwrap(), 1);
    }
}
