//! Candidate listing: every instance in a namespace, no filtering.

use clonesync_core::{Instance, Namespace, ObjectStore};

use crate::SyncError;

/// Fetches the unfiltered candidate set for a scope.
#[derive(Debug)]
pub struct CandidateLister<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ObjectStore + ?Sized> CandidateLister<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// List every instance visible in `namespace`.
    ///
    /// Order is whatever the store returns. Store failures are wrapped
    /// unchanged in [`SyncError::Retrieval`]; there is no retry.
    pub fn list(&self, namespace: &Namespace) -> Result<Vec<Instance>, SyncError> {
        if namespace.is_empty() {
            return Err(SyncError::InvalidScope);
        }
        tracing::info!(namespace = %namespace, "fetching instances");
        self.store
            .list_instances(namespace)
            .map_err(SyncError::Retrieval)
    }
}
