//! Two-file corpus indexed end to end through the in-memory ports.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use recall_harness_core::chunk::ChunkParams;
use recall_harness_core::index::{DocumentReader, Indexer};
use recall_harness_core::models::IndexedChunk;
use recall_harness_core::recall::{Archival, RecallEngine, RecallParams};
use recall_harness_core::store::memory::{
    InMemoryFactMemory, InMemoryStateStore, InMemoryVectorStore,
};
use recall_harness_core::store::{StateStore, VectorStore};

const FILE_A: &str = "/corpus/a.md";
const FILE_B: &str = "/corpus/b.md";
const SECTIONS: [&str; 3] = ["Alpha", "Beta", "Gamma"];

struct Files(HashMap<String, String>);

impl DocumentReader for Files {
    fn read(&self, file: &str) -> Result<Vec<u8>> {
        match self.0.get(file) {
            Some(text) => Ok(text.as_bytes().to_vec()),
            None => bail!("missing {}", file),
        }
    }
}

fn file_a() -> String {
    let mut doc = String::from("# Title\n\n");
    for i in 1..=40 {
        doc.push_str(&format!("line{}\n", i));
    }
    doc
}

/// Three level-2 sections, each alone larger than the default target size.
fn file_b() -> String {
    let mut doc = String::new();
    for title in SECTIONS {
        doc.push_str(&format!("## {}\n", title));
        for i in 0..30 {
            doc.push_str(&format!("{:-<50}\n", format!("{} fact {:02} ", title.to_lowercase(), i)));
        }
    }
    doc
}

fn corpus() -> Files {
    Files(HashMap::from([
        (FILE_A.to_string(), file_a()),
        (FILE_B.to_string(), file_b()),
    ]))
}

fn section_of(line: &str) -> Option<&'static str> {
    SECTIONS
        .iter()
        .copied()
        .find(|s| line.starts_with(&s.to_lowercase()) || line == format!("## {}", s))
}

fn overlap_holds(prev: &IndexedChunk, next: &IndexedChunk, k: usize) -> bool {
    let prev_lines: Vec<&str> = prev.text.lines().collect();
    let next_lines: Vec<&str> = next.text.lines().collect();
    let shared = k.min(prev_lines.len());
    next_lines.len() >= shared && prev_lines[prev_lines.len() - shared..] == next_lines[..shared]
}

#[tokio::test]
async fn two_file_corpus() {
    let vector = Arc::new(InMemoryVectorStore::new());
    let states = Arc::new(InMemoryStateStore::new());
    let indexer = Indexer::new(vector.clone(), states.clone(), ChunkParams::default());
    let files = vec![FILE_A.to_string(), FILE_B.to_string()];

    let report = indexer.index_files(&corpus(), &files, false).await;
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.files_indexed, 2);

    let a = vector.chunks_for(FILE_A).unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].header_path, "Title");

    let b = vector.chunks_for(FILE_B).unwrap();
    assert!(b.len() >= 3, "expected at least 3 chunks, got {}", b.len());
    for chunk in &b {
        let first_fresh = chunk
            .text
            .lines()
            .skip(if chunk.chunk_index == 0 { 0 } else { 3 })
            .find(|l| !l.trim().is_empty())
            .and_then(section_of)
            .unwrap();
        assert!(
            chunk.header_path.ends_with(first_fresh),
            "chunk {} header {:?}, first new line in {}",
            chunk.chunk_index,
            chunk.header_path,
            first_fresh
        );
    }
    for title in SECTIONS {
        assert!(b.iter().any(|c| c.header_path == title));
    }
    for pair in b.windows(2) {
        assert!(overlap_holds(&pair[0], &pair[1], 3));
    }

    let state = states.load().unwrap();
    assert_eq!(state.files.len(), 2);
    assert!(state.last_full_index_timestamp.is_some());
}

#[tokio::test]
async fn second_pass_and_edit() {
    let vector = Arc::new(InMemoryVectorStore::new());
    let states = Arc::new(InMemoryStateStore::new());
    let indexer = Indexer::new(vector.clone(), states.clone(), ChunkParams::default());
    let files = vec![FILE_A.to_string(), FILE_B.to_string()];
    let mut docs = corpus();

    indexer.index_files(&docs, &files, false).await;
    let total = vector.count(None).await.unwrap();
    let upserts = vector.upsert_calls();

    let again = indexer.index_files(&docs, &files, false).await;
    assert_eq!(again.chunks_written, 0);
    assert_eq!(vector.upsert_calls(), upserts);

    docs.0.insert(FILE_A.to_string(), file_a().replace("line7", "line8"));
    let edited = indexer.index_files(&docs, &files, false).await;
    assert_eq!(edited.files_indexed, 1);
    assert_eq!(edited.chunks_written, 1);
    assert_eq!(vector.count(None).await.unwrap(), total);
}

#[tokio::test]
async fn indexed_corpus_is_recallable() {
    let vector = Arc::new(InMemoryVectorStore::new());
    let indexer = Indexer::new(
        vector.clone(),
        Arc::new(InMemoryStateStore::new()),
        ChunkParams::default(),
    );
    indexer
        .index_files(&corpus(), &[FILE_B.to_string()], false)
        .await;

    let engine = RecallEngine::new(
        vector,
        Arc::new(InMemoryFactMemory::new()),
        Archival::absent("not configured"),
        RecallParams::default(),
    );
    let response = engine.recall("gamma fact", 3).await;
    assert_eq!(response.results.len(), 3);
    assert!(response
        .results
        .iter()
        .all(|r| r.result.source == "vector:b.md"));
    assert!(response.results[0].result.text.contains("gamma"));
}
