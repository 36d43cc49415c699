//! On-disk [`IndexState`] persistence.
//!
//! The state is a pretty-printed JSON file. Saves write a sibling temp
//! file and rename it over the target, so a reader sees either the old or
//! the new state in full.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use recall_harness_core::error::RecallError;
use recall_harness_core::state::IndexState;
use recall_harness_core::store::StateStore;

pub struct JsonStateFile {
    path: PathBuf,
}

impl JsonStateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "index_state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn state_err(action: &str, path: &Path, e: impl std::fmt::Display) -> anyhow::Error {
    RecallError::State(format!("{} {}: {}", action, path.display(), e)).into()
}

impl StateStore for JsonStateFile {
    fn load(&self) -> Result<IndexState> {
        if !self.path.exists() {
            return Ok(IndexState::new());
        }
        let json = std::fs::read_to_string(&self.path)
            .map_err(|e| state_err("failed to read", &self.path, e))?;
        IndexState::from_json(&json)
    }

    fn save(&self, state: &IndexState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| state_err("failed to create", parent, e))?;
            }
        }

        let tmp = self.temp_path();
        std::fs::write(&tmp, state.to_json()?).map_err(|e| state_err("failed to write", &tmp, e))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| state_err("failed to replace", &self.path, e))?;

        debug!(path = %self.path.display(), files = state.files.len(), "index state saved");
        Ok(())
    }
}
