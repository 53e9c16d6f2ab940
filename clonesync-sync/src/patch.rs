//! Two-phase persistence: snapshot before mutation, patch after.

use serde::Serialize;

use clonesync_core::{Instance, ObjectKey, ObjectStore};

use crate::SyncError;

/// Outcome of persisting a single instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PatchResult {
    /// The store accepted the change.
    Patched { key: ObjectKey, resource_version: u64 },
    /// Nothing changed since the snapshot; the store was not called.
    Unchanged { key: ObjectKey },
    /// `--dry-run` mode: the instance *would* have been patched.
    WouldPatch { key: ObjectKey },
    /// The instance was deleted after it was listed; nothing to write.
    Gone { key: ObjectKey },
}

impl PatchResult {
    pub fn key(&self) -> &ObjectKey {
        match self {
            PatchResult::Patched { key, .. }
            | PatchResult::Unchanged { key }
            | PatchResult::WouldPatch { key }
            | PatchResult::Gone { key } => key,
        }
    }

    pub fn is_change(&self) -> bool {
        matches!(
            self,
            PatchResult::Patched { .. } | PatchResult::WouldPatch { .. }
        )
    }
}

/// Holds the pre-mutation copy of an instance.
#[derive(Debug, Clone)]
pub struct PatchHelper {
    before: Instance,
}

impl PatchHelper {
    pub fn new(instance: &Instance) -> Self {
        Self {
            before: instance.clone(),
        }
    }

    pub fn before(&self) -> &Instance {
        &self.before
    }

    pub fn has_changes(&self, after: &Instance) -> bool {
        &self.before != after
    }

    /// Hand `after` to the store if it differs from the snapshot.
    ///
    /// An instance deleted since it was listed yields [`PatchResult::Gone`].
    /// Every other store error, write conflicts included, comes back as
    /// [`SyncError::Persistence`].
    pub fn patch<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        after: &Instance,
        dry_run: bool,
    ) -> Result<PatchResult, SyncError> {
        let key = after.key();
        if !self.has_changes(after) {
            tracing::debug!(instance = %key, "unchanged");
            return Ok(PatchResult::Unchanged { key });
        }

        if dry_run {
            tracing::info!(instance = %key, "[dry-run] would patch");
            return Ok(PatchResult::WouldPatch { key });
        }

        let stored = match store.patch_instance(after) {
            Ok(stored) => stored,
            Err(err) if err.is_not_found() => {
                tracing::info!(instance = %key, "instance deleted before patch; skipping");
                return Ok(PatchResult::Gone { key });
            }
            Err(err) => return Err(SyncError::Persistence(err)),
        };
        tracing::info!(
            instance = %key,
            resource_version = stored.metadata.resource_version,
            "patched",
        );
        Ok(PatchResult::Patched {
            key,
            resource_version: stored.metadata.resource_version,
        })
    }
}
