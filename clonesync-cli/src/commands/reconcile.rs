//! `clonesync reconcile`: copy template settings onto cloned machines.

use anyhow::{Context, Result};
use clap::Args;

use clonesync_core::{FileStore, Namespace, ObjectKey};
use clonesync_sync::{
    pipeline::{self, ReconcileScope},
    PatchResult, ReconcileReport,
};

/// Arguments for `clonesync reconcile`.
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Template to reconcile as `<namespace>/<name>` (omit when using `--all`).
    pub template: Option<ObjectKey>,

    /// Reconcile every template in the store.
    #[arg(long, conflicts_with = "template")]
    pub all: bool,

    /// With `--all`, limit to one namespace.
    #[arg(long, requires = "all")]
    pub namespace: Option<String>,

    /// Show what would be patched without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON reports.
    #[arg(long)]
    pub json: bool,
}

impl ReconcileArgs {
    pub fn run(self, store: &FileStore) -> Result<()> {
        let scope = if self.all {
            match self.namespace.clone() {
                Some(ns) => ReconcileScope::Namespace(Namespace::from(ns)),
                None => ReconcileScope::All,
            }
        } else {
            let key = self
                .template
                .clone()
                .context("provide a <namespace>/<template> or use --all")?;
            ReconcileScope::Template(key)
        };

        let reports = pipeline::run(store, scope.clone(), self.dry_run)
            .with_context(|| format!("reconcile failed for {}", scope_label(&scope)))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&reports)
                    .context("failed to serialize reconcile reports")?
            );
            return Ok(());
        }

        if reports.is_empty() {
            println!(
                "No templates found under {}.",
                store.namespaces_root().display()
            );
        }
        for report in &reports {
            print_report(report, self.dry_run);
        }
        Ok(())
    }
}

fn scope_label(scope: &ReconcileScope) -> String {
    match scope {
        ReconcileScope::All => "all templates".to_string(),
        ReconcileScope::Namespace(ns) => format!("namespace '{ns}'"),
        ReconcileScope::Template(key) => format!("'{key}'"),
    }
}

fn print_report(report: &ReconcileReport, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    if report.template_gone {
        println!("{prefix}· '{}' not found: nothing to do", report.template);
        return;
    }

    let value = report
        .value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{prefix}✓ '{}' reconciled (disableAutomatedClean={value}; {} matched, {} patched, {} unchanged)",
        report.template,
        report.matched.len(),
        report.changed(),
        report.unchanged(),
    );

    for patch in &report.patches {
        match patch {
            PatchResult::Patched { key, .. } => println!("  ✎  {key}"),
            PatchResult::WouldPatch { key } => println!("  ~  {key}"),
            PatchResult::Unchanged { key } => println!("  ·  {key}"),
            PatchResult::Gone { key } => println!("  ✗  {key} (deleted before patch)"),
        }
    }
}
