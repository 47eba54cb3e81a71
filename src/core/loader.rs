// src/core/loader.rs
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{ArchflowError, Result};
use super::facts::FactBatch;

/// Reads fact batches written by the extractor as JSON files
pub struct FactLoader {
    extension: String,
}

impl FactLoader {
    pub fn new() -> Self {
        Self {
            extension: "json".to_string(),
        }
    }

    /// Load batches from files and directories, in path order.
    ///
    /// Directories are walked recursively and sorted by file name so that
    /// batch order, and with it ownership tie-breaking, is reproducible.
    pub async fn load_paths(&self, paths: &[PathBuf]) -> Result<Vec<FactBatch>> {
        let mut batches = Vec::new();

        for path in paths {
            if path.is_dir() {
                for file in self.collect_files(path)? {
                    batches.push(self.load_file(&file).await?);
                }
            } else if path.is_file() {
                batches.push(self.load_file(path).await?);
            } else {
                warn!("Fact path {} does not exist, skipping", path.display());
            }
        }

        Ok(batches)
    }

    /// Load a single batch; an empty `source` is replaced by the file path
    pub async fn load_file(&self, path: &Path) -> Result<FactBatch> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut batch: FactBatch = serde_json::from_str(&content).map_err(|e| ArchflowError::FactLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if batch.source.is_empty() {
            batch.source = path.display().to_string();
        }

        debug!(
            "Loaded {} types and {} calls from {}",
            batch.types.len(),
            batch.calls.len(),
            path.display()
        );
        Ok(batch)
    }

    fn collect_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| ArchflowError::FactLoad {
                path: dir.to_path_buf(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if path.is_file() && self.is_fact_file(path) {
                files.push(path.to_path_buf());
            }
        }
        Ok(files)
    }

    fn is_fact_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext == self.extension)
    }
}

impl Default for FactLoader {
    fn default() -> Self {
        Self::new()
    }
}
