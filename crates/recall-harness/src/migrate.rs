//! Idempotent schema setup for the SQLite stores.
//!
//! FTS5 `CREATE VIRTUAL TABLE` has no `IF NOT EXISTS` guard we can rely on
//! across SQLite versions, so each virtual table is created only after
//! checking `sqlite_master`.

use anyhow::Result;
use sqlx::SqlitePool;

async fn fts_table_exists(pool: &SqlitePool, name: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Tables behind [`SqliteVectorStore`](crate::sqlite_store::SqliteVectorStore).
pub async fn migrate_vectors(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source_file TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            header_path TEXT NOT NULL DEFAULT '',
            text TEXT NOT NULL,
            indexed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    if !fts_table_exists(pool, "chunks_fts").await? {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                source_file UNINDEXED,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source_file ON chunks(source_file)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Tables behind [`SqliteFactMemory`](crate::sqlite_store::SqliteFactMemory).
pub async fn migrate_facts(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS facts (
            id TEXT PRIMARY KEY,
            subject TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    if !fts_table_exists(pool, "facts_fts").await? {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE facts_fts USING fts5(
                fact_id UNINDEXED,
                subject UNINDEXED,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_facts_subject ON facts(subject)")
        .execute(pool)
        .await?;

    Ok(())
}
