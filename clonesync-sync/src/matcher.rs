//! Lineage matching: pick the candidates cloned from a given template.
//!
//! An instance matches iff both halves of its lineage, source name and
//! source group/kind, equal the template's identity exactly. Missing
//! lineage is a non-match. Output keeps input order, and an object key that
//! appears more than once in the candidates is selected only the first time.

use std::collections::HashSet;

use clonesync_core::{Instance, Lineage, ObjectKey, Template};

/// Selects instances whose recorded lineage equals a template identity.
#[derive(Debug, Clone)]
pub struct LineageMatcher {
    identity: Lineage,
}

impl LineageMatcher {
    pub fn new(template: &Template) -> Self {
        Self {
            identity: template.identity(),
        }
    }

    pub fn identity(&self) -> &Lineage {
        &self.identity
    }

    pub fn is_match(&self, instance: &Instance) -> bool {
        instance
            .lineage()
            .is_some_and(|lineage| lineage == self.identity)
    }

    /// Matching instances as shared borrows, in input order.
    pub fn select<'a>(&self, candidates: &'a [Instance]) -> Vec<&'a Instance> {
        let mut seen = HashSet::new();
        let matched: Vec<&Instance> = candidates
            .iter()
            .filter(|instance| self.accept(instance, &mut seen))
            .collect();
        self.log_count(matched.len());
        matched
    }

    /// Matching instances as mutable borrows, in input order.
    pub fn select_mut<'a>(&self, candidates: &'a mut [Instance]) -> Vec<&'a mut Instance> {
        let mut seen = HashSet::new();
        let matched: Vec<&mut Instance> = candidates
            .iter_mut()
            .filter(|instance| self.accept(instance, &mut seen))
            .collect();
        self.log_count(matched.len());
        matched
    }

    fn accept(&self, instance: &Instance, seen: &mut HashSet<ObjectKey>) -> bool {
        if !self.is_match(instance) {
            return false;
        }
        let key = instance.key();
        if !seen.insert(key.clone()) {
            tracing::warn!(instance = %key, "duplicate candidate skipped");
            return false;
        }
        tracing::debug!(
            instance = %key,
            template = %self.identity.source_name,
            "lineage matched template",
        );
        true
    }

    fn log_count(&self, count: usize) {
        tracing::info!(
            template = %self.identity.source_name,
            group_kind = %self.identity.source_group_kind,
            matched = count,
            "instances found with lineage matching template",
        );
    }
}
