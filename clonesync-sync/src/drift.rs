//! Read-only drift detection between a template and its clones.
//!
//! Signal precedence:
//! 1. `TemplateGone` (template missing from the store)
//! 2. `NoInstances` (nothing carries the template's lineage)
//! 3. `Drifted` (at least one clone holds a different value)
//! 4. `InSync`

use clonesync_core::{ObjectKey, ObjectStore};

use crate::lister::CandidateLister;
use crate::matcher::LineageMatcher;
use crate::synchronizer::FieldSynchronizer;
use crate::SyncError;

/// Drift classification for a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftSignal {
    TemplateGone,
    NoInstances,
    InSync { matched: usize },
    Drifted { instances: Vec<ObjectKey> },
}

impl DriftSignal {
    /// Stable snake_case name used in JSON output.
    pub fn key(&self) -> &'static str {
        match self {
            DriftSignal::TemplateGone => "template_gone",
            DriftSignal::NoInstances => "no_instances",
            DriftSignal::InSync { .. } => "in_sync",
            DriftSignal::Drifted { .. } => "drifted",
        }
    }

    pub fn needs_reconcile(&self) -> bool {
        matches!(self, DriftSignal::Drifted { .. })
    }
}

/// Check the clones of `key` against the template's current value.
pub fn check<S: ObjectStore + ?Sized>(store: &S, key: &ObjectKey) -> Result<DriftSignal, SyncError> {
    let template = match store.get_template(key) {
        Ok(template) => template,
        Err(err) if err.is_not_found() => return Ok(DriftSignal::TemplateGone),
        Err(err) => return Err(SyncError::Retrieval(err)),
    };

    let candidates = CandidateLister::new(store).list(&template.metadata.namespace)?;
    let matched = LineageMatcher::new(&template).select(&candidates);
    if matched.is_empty() {
        return Ok(DriftSignal::NoInstances);
    }

    let synchronizer = FieldSynchronizer::new(&template);
    let mut drifted: Vec<ObjectKey> = matched
        .iter()
        .filter(|i| !synchronizer.is_synced(i))
        .map(|i| i.key())
        .collect();
    if drifted.is_empty() {
        return Ok(DriftSignal::InSync {
            matched: matched.len(),
        });
    }
    drifted.sort();
    Ok(DriftSignal::Drifted { instances: drifted })
}
