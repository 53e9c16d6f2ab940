//! Dry-run unified diff support for `clonesync diff`.

use similar::TextDiff;

use clonesync_core::{Instance, ObjectKey, ObjectStore};

use crate::lister::CandidateLister;
use crate::reconcile::sync;
use crate::SyncError;

/// A single instance diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDiff {
    pub instance: ObjectKey,
    pub unified_diff: String,
}

/// Diff result for a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffTemplateResult {
    pub template: ObjectKey,
    pub template_gone: bool,
    pub diffs: Vec<InstanceDiff>,
}

/// Compute what reconciling `key` would change on each clone, as YAML diffs.
///
/// Nothing is written.
pub fn diff_template<S: ObjectStore + ?Sized>(
    store: &S,
    key: &ObjectKey,
) -> Result<DiffTemplateResult, SyncError> {
    let template = match store.get_template(key) {
        Ok(template) => template,
        Err(err) if err.is_not_found() => {
            return Ok(DiffTemplateResult {
                template: key.clone(),
                template_gone: true,
                diffs: Vec::new(),
            });
        }
        Err(err) => return Err(SyncError::Retrieval(err)),
    };

    let before = CandidateLister::new(store).list(&template.metadata.namespace)?;
    let mut after = before.clone();
    sync(&template, &mut after);

    let mut diffs = Vec::new();
    for (old, new) in before.iter().zip(after.iter()) {
        if old == new {
            continue;
        }
        diffs.push(InstanceDiff {
            instance: new.key(),
            unified_diff: render_diff(old, new)?,
        });
    }

    Ok(DiffTemplateResult {
        template: key.clone(),
        template_gone: false,
        diffs,
    })
}

fn render_diff(old: &Instance, new: &Instance) -> Result<String, SyncError> {
    let old_yaml = serde_yaml::to_string(old)?;
    let new_yaml = serde_yaml::to_string(new)?;
    let path = format!("{}/{}.yaml", new.metadata.namespace, new.metadata.name);
    let old_header = format!("a/{path}");
    let new_header = format!("b/{path}");
    Ok(TextDiff::from_lines(&old_yaml, &new_yaml)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string())
}
