//! Shared reconcile pipeline entrypoint used by CLI and daemon.

use clonesync_core::{Namespace, ObjectKey, ObjectStore};

use crate::reconcile::{reconcile, reconcile_template, ReconcileReport};
use crate::SyncError;

/// Scope for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileScope {
    /// Every template in the store.
    All,
    /// Every template in one namespace.
    Namespace(Namespace),
    /// A single template.
    Template(ObjectKey),
}

/// Run the reconcile pipeline for a scope.
///
/// Templates are processed one at a time in key order; the first error
/// stops the run.
pub fn run<S: ObjectStore + ?Sized>(
    store: &S,
    scope: ReconcileScope,
    dry_run: bool,
) -> Result<Vec<ReconcileReport>, SyncError> {
    let namespace = match scope {
        ReconcileScope::Template(key) => return Ok(vec![reconcile(store, &key, dry_run)?]),
        ReconcileScope::All => None,
        ReconcileScope::Namespace(ns) => Some(ns),
    };

    let mut templates = store
        .list_templates(namespace.as_ref())
        .map_err(SyncError::Retrieval)?;
    templates.sort_by_key(|t| t.key());

    let mut reports = Vec::with_capacity(templates.len());
    for template in &templates {
        reports.push(reconcile_template(store, template, dry_run)?);
    }
    Ok(reports)
}
