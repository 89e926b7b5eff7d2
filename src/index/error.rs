use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors raised while building a catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("XML document {path} is malformed: {message}")]
    Document { path: PathBuf, message: String },

    #[error("Enrichment cache error: {0}")]
    Cache(#[from] serde_json::Error),

    #[error("Invalid file pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("{0}")]
    Other(String),
}

impl CatalogError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CatalogError::Io {
            path: path.into(),
            source,
        }
    }
}
