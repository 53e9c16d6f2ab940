//! The object store seam and its in-memory implementation.
//!
//! Every component that touches stored objects receives an [`ObjectStore`]
//! explicitly; nothing in the workspace reaches for a global handle.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::StoreError;
use crate::types::{Instance, Namespace, ObjectKey, Template};

/// Access to templates and instances.
///
/// Implementations must report absence of a template as
/// [`StoreError::NotFound`] and reject writes carrying a stale
/// `resource_version` with [`StoreError::Conflict`].
pub trait ObjectStore {
    fn get_template(&self, key: &ObjectKey) -> Result<Template, StoreError>;

    /// Every template, optionally limited to one namespace, sorted by key.
    fn list_templates(&self, namespace: Option<&Namespace>) -> Result<Vec<Template>, StoreError>;

    fn list_instances(&self, namespace: &Namespace) -> Result<Vec<Instance>, StoreError>;

    /// Persist `instance`, returning the stored copy with its new resource version.
    fn patch_instance(&self, instance: &Instance) -> Result<Instance, StoreError>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for &S {
    fn get_template(&self, key: &ObjectKey) -> Result<Template, StoreError> {
        (**self).get_template(key)
    }

    fn list_templates(&self, namespace: Option<&Namespace>) -> Result<Vec<Template>, StoreError> {
        (**self).list_templates(namespace)
    }

    fn list_instances(&self, namespace: &Namespace) -> Result<Vec<Instance>, StoreError> {
        (**self).list_instances(namespace)
    }

    fn patch_instance(&self, instance: &Instance) -> Result<Instance, StoreError> {
        (**self).patch_instance(instance)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Number of calls served, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub gets: usize,
    pub lists: usize,
    pub patches: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    templates: BTreeMap<ObjectKey, Template>,
    instances: BTreeMap<ObjectKey, Instance>,
    calls: StoreCalls,
    fail_next_list: Option<String>,
    fail_next_patch: Option<String>,
}

/// Mutex-guarded in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a template without a version check.
    pub fn insert_template(&self, template: Template) {
        self.lock().templates.insert(template.key(), template);
    }

    /// Insert or replace an instance without a version check.
    pub fn insert_instance(&self, instance: Instance) {
        self.lock().instances.insert(instance.key(), instance);
    }

    pub fn remove_template(&self, key: &ObjectKey) -> Option<Template> {
        self.lock().templates.remove(key)
    }

    pub fn instance(&self, key: &ObjectKey) -> Option<Instance> {
        self.lock().instances.get(key).cloned()
    }

    pub fn calls(&self) -> StoreCalls {
        self.lock().calls
    }

    /// Make the next `list_instances` call fail with [`StoreError::Unavailable`].
    pub fn fail_next_list(&self, reason: impl Into<String>) {
        self.lock().fail_next_list = Some(reason.into());
    }

    /// Make the next `patch_instance` call fail with [`StoreError::Unavailable`].
    pub fn fail_next_patch(&self, reason: impl Into<String>) {
        self.lock().fail_next_patch = Some(reason.into());
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObjectStore for MemoryStore {
    fn get_template(&self, key: &ObjectKey) -> Result<Template, StoreError> {
        let mut state = self.lock();
        state.calls.gets += 1;
        state
            .templates
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "template",
                key: key.clone(),
            })
    }

    fn list_templates(&self, namespace: Option<&Namespace>) -> Result<Vec<Template>, StoreError> {
        let state = self.lock();
        Ok(state
            .templates
            .values()
            .filter(|t| namespace.map_or(true, |ns| &t.metadata.namespace == ns))
            .cloned()
            .collect())
    }

    fn list_instances(&self, namespace: &Namespace) -> Result<Vec<Instance>, StoreError> {
        let mut state = self.lock();
        state.calls.lists += 1;
        if let Some(reason) = state.fail_next_list.take() {
            return Err(StoreError::Unavailable(reason));
        }
        Ok(state
            .instances
            .values()
            .filter(|i| &i.metadata.namespace == namespace)
            .cloned()
            .collect())
    }

    fn patch_instance(&self, instance: &Instance) -> Result<Instance, StoreError> {
        let mut state = self.lock();
        state.calls.patches += 1;
        if let Some(reason) = state.fail_next_patch.take() {
            return Err(StoreError::Unavailable(reason));
        }
        let key = instance.key();
        let Some(current) = state.instances.get_mut(&key) else {
            return Err(StoreError::NotFound {
                kind: "instance",
                key,
            });
        };
        if current.metadata.resource_version != instance.metadata.resource_version {
            return Err(StoreError::Conflict {
                key,
                expected: instance.metadata.resource_version,
                found: current.metadata.resource_version,
            });
        }
        let mut stored = instance.clone();
        stored.metadata.resource_version += 1;
        *current = stored.clone();
        Ok(stored)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
