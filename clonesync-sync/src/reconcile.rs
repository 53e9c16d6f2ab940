//! Reconciliation of one template against its clones.
//!
//! Sequence: fetch template → list candidates → match lineage →
//! synchronize field → patch. A template that no longer exists ends the
//! sequence successfully before any listing happens.

use chrono::{DateTime, Utc};
use serde::Serialize;

use clonesync_core::{Instance, ObjectKey, ObjectStore, Template};

use crate::lister::CandidateLister;
use crate::matcher::LineageMatcher;
use crate::patch::{PatchHelper, PatchResult};
use crate::synchronizer::FieldSynchronizer;
use crate::SyncError;

/// Match `candidates` against `template` and copy the field onto every match.
///
/// Performs no I/O. The returned borrows point into `candidates`, which
/// carry the mutation; persisting them is the caller's job. Calling this
/// again with the same template changes nothing further.
pub fn sync<'a>(template: &Template, candidates: &'a mut [Instance]) -> Vec<&'a mut Instance> {
    let mut matched = LineageMatcher::new(template).select_mut(candidates);
    FieldSynchronizer::new(template).synchronize(&mut matched);
    matched
}

/// What one reconciliation attempt did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub template: ObjectKey,
    /// The template was not found; nothing else was attempted.
    pub template_gone: bool,
    /// Value copied onto the matched instances.
    pub value: Option<bool>,
    /// Instances listed in the template's namespace.
    pub candidates: usize,
    pub matched: Vec<ObjectKey>,
    pub patches: Vec<PatchResult>,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconcileReport {
    fn missing(template: ObjectKey) -> Self {
        Self {
            template,
            template_gone: true,
            value: None,
            candidates: 0,
            matched: Vec::new(),
            patches: Vec::new(),
            reconciled_at: Utc::now(),
        }
    }

    /// Number of instances patched, or that would be under `--dry-run`.
    pub fn changed(&self) -> usize {
        self.patches.iter().filter(|p| p.is_change()).count()
    }

    pub fn unchanged(&self) -> usize {
        self.patches
            .iter()
            .filter(|p| matches!(p, PatchResult::Unchanged { .. }))
            .count()
    }

    /// Matched instances that were deleted before they could be patched.
    pub fn vanished(&self) -> usize {
        self.patches
            .iter()
            .filter(|p| matches!(p, PatchResult::Gone { .. }))
            .count()
    }
}

/// Fetch the template behind `key` and reconcile it.
///
/// A missing template is a successful no-op; any other fetch failure is
/// [`SyncError::Retrieval`].
pub fn reconcile<S: ObjectStore + ?Sized>(
    store: &S,
    key: &ObjectKey,
    dry_run: bool,
) -> Result<ReconcileReport, SyncError> {
    let template = match store.get_template(key) {
        Ok(template) => template,
        Err(err) if err.is_not_found() => {
            tracing::info!(template = %key, "template not found; nothing to reconcile");
            return Ok(ReconcileReport::missing(key.clone()));
        }
        Err(err) => return Err(SyncError::Retrieval(err)),
    };
    reconcile_template(store, &template, dry_run)
}

/// Reconcile an already-fetched template.
///
/// Every mutated instance is handed to the store in match order. An
/// instance deleted in the meantime is recorded as gone and skipped; the
/// first other persistence failure abandons the rest and is returned as is.
pub fn reconcile_template<S: ObjectStore + ?Sized>(
    store: &S,
    template: &Template,
    dry_run: bool,
) -> Result<ReconcileReport, SyncError> {
    let key = template.key();
    let mut candidates = CandidateLister::new(store).list(&template.metadata.namespace)?;
    let candidate_count = candidates.len();

    let mut matched = LineageMatcher::new(template).select_mut(&mut candidates);
    let helpers: Vec<PatchHelper> = matched.iter().map(|i| PatchHelper::new(i)).collect();
    let synchronizer = FieldSynchronizer::new(template);
    synchronizer.synchronize(&mut matched);

    let mut patches = Vec::with_capacity(matched.len());
    for (helper, instance) in helpers.iter().zip(matched.iter()) {
        patches.push(helper.patch(store, instance, dry_run)?);
    }

    let report = ReconcileReport {
        template: key,
        template_gone: false,
        value: Some(synchronizer.value()),
        candidates: candidate_count,
        matched: matched.iter().map(|i| i.key()).collect(),
        patches,
        reconciled_at: Utc::now(),
    };
    tracing::info!(
        template = %report.template,
        disable_automated_clean = synchronizer.value(),
        matched = report.matched.len(),
        changed = report.changed(),
        dry_run,
        "reconcile complete",
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use clonesync_core::{GroupKind, Lineage, MemoryStore, Namespace, StoreError};

    use super::*;

    /// Lists one extra instance that the backing store no longer holds.
    struct StaleListing {
        inner: MemoryStore,
        deleted: Instance,
    }

    impl ObjectStore for StaleListing {
        fn get_template(&self, key: &ObjectKey) -> Result<Template, StoreError> {
            self.inner.get_template(key)
        }

        fn list_templates(&self, namespace: Option<&Namespace>) -> Result<Vec<Template>, StoreError> {
            self.inner.list_templates(namespace)
        }

        fn list_instances(&self, namespace: &Namespace) -> Result<Vec<Instance>, StoreError> {
            let mut listed = vec![self.deleted.clone()];
            listed.extend(self.inner.list_instances(namespace)?);
            Ok(listed)
        }

        fn patch_instance(&self, instance: &Instance) -> Result<Instance, StoreError> {
            self.inner.patch_instance(instance)
        }
    }

    fn template(value: bool) -> Template {
        let mut template = Template::new("metal3", "tpl-a");
        template.group_kind = GroupKind::from("infra");
        template.spec.disable_automated_clean = value;
        template
    }

    fn cloned(name: &str, source: &str, group_kind: &str) -> Instance {
        Instance::new("metal3", name).with_lineage(&Lineage::new(source, group_kind))
    }

    fn seeded(value: bool) -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_template(template(value));
        store.insert_instance(cloned("i1", "tpl-a", "infra"));
        store.insert_instance(cloned("i2", "tpl-b", "infra"));
        store.insert_instance(cloned("i3", "tpl-a", "infra"));
        store
    }

    #[test]
    fn sync_matches_and_mutates_in_place() {
        let mut candidates = vec![
            cloned("i1", "tpl-a", "infra"),
            cloned("i2", "tpl-b", "infra"),
            cloned("i3", "tpl-a", "infra"),
        ];
        let matched = sync(&template(true), &mut candidates);
        let names: Vec<_> = matched.iter().map(|i| i.metadata.name.0.clone()).collect();
        assert_eq!(names, ["i1", "i3"]);

        assert!(candidates[0].spec.disable_automated_clean);
        assert!(!candidates[1].spec.disable_automated_clean);
        assert!(candidates[2].spec.disable_automated_clean);
    }

    #[test]
    fn reconcile_patches_only_changed_matches() {
        let store = seeded(true);
        let report = reconcile(&store, &ObjectKey::new("metal3", "tpl-a"), false).expect("reconcile");

        assert!(!report.template_gone);
        assert_eq!(report.candidates, 3);
        assert_eq!(
            report.matched,
            vec![ObjectKey::new("metal3", "i1"), ObjectKey::new("metal3", "i3")]
        );
        assert_eq!(report.changed(), 2);
        assert_eq!(store.calls().patches, 2);
        assert!(!store
            .instance(&ObjectKey::new("metal3", "i2"))
            .expect("i2")
            .spec
            .disable_automated_clean);
    }

    #[test]
    fn second_reconcile_is_a_no_op() {
        let store = seeded(true);
        let key = ObjectKey::new("metal3", "tpl-a");
        reconcile(&store, &key, false).expect("first");
        let second = reconcile(&store, &key, false).expect("second");
        assert_eq!(second.changed(), 0);
        assert_eq!(second.unchanged(), 2);
        assert_eq!(store.calls().patches, 2, "no further store writes");
    }

    #[test]
    fn template_false_matches_default_instances_without_writes() {
        let store = seeded(false);
        let report = reconcile(&store, &ObjectKey::new("metal3", "tpl-a"), false).expect("reconcile");
        assert_eq!(report.matched.len(), 2);
        assert_eq!(report.changed(), 0);
        assert_eq!(report.value, Some(false));
    }

    #[test]
    fn missing_template_stops_before_listing() {
        let store = seeded(true);
        let report =
            reconcile(&store, &ObjectKey::new("metal3", "deleted"), false).expect("reconcile");
        assert!(report.template_gone);
        assert!(report.matched.is_empty());
        assert_eq!(store.calls().lists, 0);
        assert_eq!(store.calls().patches, 0);
    }

    #[test]
    fn listing_failure_is_a_retrieval_error() {
        let store = seeded(true);
        store.fail_next_list("connection refused");
        let err = reconcile(&store, &ObjectKey::new("metal3", "tpl-a"), false).unwrap_err();
        assert!(
            matches!(err, SyncError::Retrieval(StoreError::Unavailable(_))),
            "got: {err}"
        );
    }

    #[test]
    fn instance_deleted_after_listing_does_not_stop_the_rest() {
        let store = StaleListing {
            inner: seeded(true),
            deleted: cloned("gone", "tpl-a", "infra"),
        };
        let report =
            reconcile(&store, &ObjectKey::new("metal3", "tpl-a"), false).expect("reconcile");

        assert_eq!(
            report.patches[0],
            PatchResult::Gone {
                key: ObjectKey::new("metal3", "gone")
            }
        );
        assert_eq!(report.vanished(), 1);
        assert_eq!(report.changed(), 2);
        for name in ["i1", "i3"] {
            assert!(
                store
                    .inner
                    .instance(&ObjectKey::new("metal3", name))
                    .expect("live clone")
                    .spec
                    .disable_automated_clean,
                "{name} must still be synced"
            );
        }
    }

    #[test]
    fn patch_failure_abandons_remaining_instances() {
        let store = seeded(true);
        store.fail_next_patch("write timeout");
        let err = reconcile(&store, &ObjectKey::new("metal3", "tpl-a"), false).unwrap_err();
        assert!(matches!(err, SyncError::Persistence(_)), "got: {err}");
        assert_eq!(store.calls().patches, 1, "stops at the first failure");
        assert!(!store
            .instance(&ObjectKey::new("metal3", "i3"))
            .expect("i3")
            .spec
            .disable_automated_clean);
    }
}
