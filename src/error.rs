use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Archflow operations
#[derive(Error, Debug)]
pub enum ArchflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to load facts from {path}: {message}")]
    FactLoad { path: PathBuf, message: String },

    #[error("Graph invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Unknown entry point: {0}")]
    UnknownEntryPoint(String),
}

pub type Result<T> = std::result::Result<T, ArchflowError>;
