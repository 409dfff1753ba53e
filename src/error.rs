//! Error taxonomy for the indexing and query pipeline.
//!
//! Every failure inside an index build or a pipeline run surfaces as exactly
//! one [`RagError`]. The HTTP layer renders any of them as a `500` with the
//! error's display text; the "no documents found" outcome is not an error.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used by the library modules.
pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// The corpus directory is missing, or holds files but none eligible.
    #[error("corpus not found: {path} ({reason})")]
    CorpusNotFound { path: PathBuf, reason: String },

    /// No index snapshot at the configured path, or no index loaded.
    #[error("vector index not found at {path}. Please run the index command first.")]
    IndexNotFound { path: PathBuf },

    /// An embedding or generation backend failed (network, auth, bad payload).
    #[error("{provider} provider failed: {message}")]
    ProviderInvocation { provider: String, message: String },

    /// The index was built with a different embedding provider or dimension.
    #[error("embedding configuration mismatch: index built with {indexed}, query uses {current}")]
    ConfigurationMismatch { indexed: String, current: String },

    /// The snapshot exists but cannot be decoded.
    #[error("invalid index snapshot at {path}: {message}")]
    Snapshot { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub(crate) fn provider(provider: impl Into<String>, message: impl ToString) -> Self {
        RagError::ProviderInvocation {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn snapshot(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        RagError::Snapshot {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
