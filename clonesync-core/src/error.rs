//! Error types for clonesync-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ObjectKey;

/// All errors that can arise from object store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure (permission denied, disk full, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse object at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The requested object does not exist.
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: ObjectKey },

    /// Optimistic-concurrency check failed on write.
    #[error("conflict writing {key}: expected resource version {expected}, found {found}")]
    Conflict {
        key: ObjectKey,
        expected: u64,
        found: u64,
    },

    /// A stored manifest disagrees with the location it was loaded from.
    #[error("object at {path} does not match its location: {detail}")]
    Mismatch { path: PathBuf, detail: String },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.clonesync/`.
    #[error("cannot determine home directory; set $HOME or pass --root")]
    HomeNotFound,

    /// The store could not serve the request right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
