//! Error types for the export phase

use std::path::PathBuf;
use thiserror::Error;

/// A script could not be loaded, failed while running, or returned something
/// the runner does not understand.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("{script}: cannot load: {message}")]
    Load { script: String, message: String },

    #[error("{script}: main() failed: {message}")]
    Execution { script: String, message: String },

    #[error("{script}: main() panicked: {message}")]
    Panicked { script: String, message: String },

    #[error("{script}: unsupported return value: {found}")]
    UnsupportedReturn { script: String, found: String },

    #[error("{script}: timed out after {seconds:.1}s")]
    Timeout { script: String, seconds: f64 },
}

impl LoadError {
    /// Name of the script the error belongs to.
    pub fn script(&self) -> &str {
        match self {
            LoadError::Load { script, .. }
            | LoadError::Execution { script, .. }
            | LoadError::Panicked { script, .. }
            | LoadError::UnsupportedReturn { script, .. }
            | LoadError::Timeout { script, .. } => script,
        }
    }
}

/// Failure reported by a geometry exporter for a single model handle.
#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("invalid geometry: {0}")]
    Invalid(String),

    #[error("exporter failed: {0}")]
    Exporter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid exporter output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializing one model failed. Tagged with the owning script because the
/// failure abandons the rest of that script's models.
#[derive(Error, Debug)]
#[error("{script}: export of {model} failed: {source}")]
pub struct ExportError {
    pub script: String,
    pub model: String,
    #[source]
    pub source: GeometryError,
}

/// Writing or reading an intermediate document or an output image failed.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid viewer document {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
