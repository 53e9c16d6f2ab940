//! Error types for clonesync-sync.

use thiserror::Error;

use clonesync_core::StoreError;

/// All errors that can arise from a reconciliation attempt.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The lister was handed an empty namespace.
    #[error("cannot list instances: scope is empty")]
    InvalidScope,

    /// Fetching the template or listing instances failed.
    #[error("retrieval failed: {0}")]
    Retrieval(#[source] StoreError),

    /// Handing a mutated instance to the store failed.
    #[error("persistence failed: {0}")]
    Persistence(#[source] StoreError),

    /// Rendering an instance as YAML for a diff failed.
    #[error("YAML rendering error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SyncError {
    /// The store error behind a retrieval or persistence failure.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            SyncError::Retrieval(err) | SyncError::Persistence(err) => Some(err),
            _ => None,
        }
    }
}
