//! Corpus discovery and file reading.
//!
//! The corpus is one distinguished top-level file plus every file under
//! `corpus.dir` whose path relative to the directory matches
//! `corpus.pattern`. `*` does not cross directory separators, so the
//! default `*.md` covers the directory's own files and `**/*.md` recurses.
//!
//! Files are identified by canonical absolute path. The root file comes
//! first, then directory matches in lexicographic order; a file reachable
//! both ways is indexed once. Symlinks are followed unless
//! `corpus.follow_symlinks` is off, in which case linked files are ignored.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use globset::GlobBuilder;
use tracing::warn;
use walkdir::WalkDir;

use recall_harness_core::index::{DocumentReader, IndexError};

use crate::config::CorpusConfig;

/// Reads documents straight from the filesystem.
pub struct FsReader;

impl DocumentReader for FsReader {
    fn read(&self, file: &str) -> Result<Vec<u8>> {
        std::fs::read(file).with_context(|| format!("Failed to read {}", file))
    }
}

fn identity(path: &Path) -> Result<String> {
    let canonical = std::fs::canonicalize(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    Ok(canonical.to_string_lossy().to_string())
}

/// Files found by [`collect_files`], plus the entries that could not be
/// resolved. An unreadable entry never hides the rest of the corpus.
#[derive(Debug, Default)]
pub struct CorpusScan {
    pub files: Vec<String>,
    pub errors: Vec<IndexError>,
}

impl CorpusScan {
    fn skip(&mut self, file: &Path, e: impl std::fmt::Display) {
        warn!(path = %file.display(), error = %e, "skipping unreadable corpus entry");
        self.errors.push(IndexError {
            file: file.display().to_string(),
            message: e.to_string(),
        });
    }
}

/// Files to index, in indexing order. Missing paths are skipped.
///
/// Only an invalid `corpus.pattern` fails the scan.
pub fn collect_files(corpus: &CorpusConfig) -> Result<CorpusScan> {
    let mut scan = CorpusScan::default();
    let mut seen = HashSet::new();

    if let Some(root_file) = &corpus.root_file {
        if root_file.is_file() {
            match identity(root_file) {
                Ok(id) => {
                    seen.insert(id.clone());
                    scan.files.push(id);
                }
                Err(e) => scan.skip(root_file, format!("{:#}", e)),
            }
        } else {
            warn!(path = %root_file.display(), "root file not found, skipping");
        }
    }

    let dir = &corpus.dir;
    if !dir.is_dir() {
        warn!(path = %dir.display(), "corpus directory not found, skipping");
        return Ok(scan);
    }

    let matcher = GlobBuilder::new(&corpus.pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("Invalid corpus.pattern: {}", corpus.pattern))?
        .compile_matcher();

    let mut matched = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(corpus.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(dir.as_path()).to_path_buf();
                scan.skip(&path, e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        if !matcher.is_match(relative) {
            continue;
        }
        match identity(path) {
            Ok(id) => matched.push(id),
            Err(e) => scan.skip(path, format!("{:#}", e)),
        }
    }
    matched.sort();

    for id in matched {
        if seen.insert(id.clone()) {
            scan.files.push(id);
        }
    }

    Ok(scan)
}
