//! One-way copy of `disableAutomatedClean` from a template to its clones.

use clonesync_core::{Instance, Template};

/// Copies the template's value onto matched instances in memory.
#[derive(Debug, Clone, Copy)]
pub struct FieldSynchronizer {
    disable_automated_clean: bool,
}

impl FieldSynchronizer {
    pub fn new(template: &Template) -> Self {
        Self {
            disable_automated_clean: template.spec.disable_automated_clean,
        }
    }

    pub fn value(&self) -> bool {
        self.disable_automated_clean
    }

    /// Overwrite the field on every instance, whether or not it already matches.
    pub fn synchronize(&self, matched: &mut [&mut Instance]) {
        for instance in matched.iter_mut() {
            instance.spec.disable_automated_clean = self.disable_automated_clean;
        }
    }

    /// Whether `instance` already carries the template's value.
    pub fn is_synced(&self, instance: &Instance) -> bool {
        instance.spec.disable_automated_clean == self.disable_automated_clean
    }
}
