//! `clonesync diff <namespace>/<template>`: show unified diffs for what reconcile would patch.

use anyhow::{Context, Result};
use clap::Args;

use clonesync_core::{FileStore, ObjectKey};
use clonesync_sync::diff_template;

/// Arguments for `clonesync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Template to diff as `<namespace>/<name>`.
    pub template: ObjectKey,
}

impl DiffArgs {
    pub fn run(self, store: &FileStore) -> Result<()> {
        let result = diff_template(store, &self.template)
            .with_context(|| format!("diff failed for '{}'", self.template))?;

        if result.template_gone {
            println!("Template '{}' not found.", result.template);
            return Ok(());
        }
        if result.diffs.is_empty() {
            println!("No differences for '{}'.", result.template);
            return Ok(());
        }

        for diff in result.diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }

        Ok(())
    }
}
