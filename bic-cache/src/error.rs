//! Error types for bic-cache.

use std::path::PathBuf;

use thiserror::Error;

use bic_core::CoreError;

/// All errors that can arise from change detection and cache persistence.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Crawling the package's tracked file set failed.
    #[error("crawl error: {0}")]
    Crawl(#[from] CoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (cache write path).
    #[error("cache JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking stat/digest task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Convenience constructor for [`CacheError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.into(),
        source,
    }
}
