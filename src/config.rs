use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ArchflowError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Graph resolution settings
    pub analysis: AnalysisConfig,

    /// Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Files or directories holding extracted fact batches
    pub facts_dirs: Vec<PathBuf>,

    /// Where generated graphs and chains are written
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Merge the directly raised events of same-named methods across types
    pub merge_same_name_events: bool,

    /// Suffixes stripped from entity names by the ownership naming heuristic
    pub ownership_suffixes: Vec<String>,

    /// Analyse independent fact batches concurrently
    pub parallel_batches: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output formats to write (json, mermaid)
    pub formats: Vec<String>,

    /// Include generation timestamp and graph fingerprint
    pub include_metadata: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            merge_same_name_events: true,
            ownership_suffixes: vec![
                "Item".to_string(),
                "Detail".to_string(),
                "Info".to_string(),
                "Line".to_string(),
            ],
            parallel_batches: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig {
                name: "Unnamed Project".to_string(),
                facts_dirs: vec![PathBuf::from("facts")],
                output_dir: PathBuf::from("architecture"),
            },
            analysis: AnalysisConfig::default(),
            output: OutputConfig {
                formats: vec!["json".to_string(), "mermaid".to_string()],
                include_metadata: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ArchflowError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ArchflowError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "Archflow.toml",
                    "archflow.toml",
                    ".archflow.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }
}
