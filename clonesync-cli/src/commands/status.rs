//! `clonesync status`: drift visibility per template.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use clonesync_core::{FileStore, Namespace, ObjectKey, ObjectStore, Template};
use clonesync_sync::drift::{check, DriftSignal};

/// Arguments for `clonesync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Filter to a single namespace.
    #[arg(long)]
    pub namespace: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, store: &FileStore) -> Result<()> {
        let namespace = self.namespace.clone().map(Namespace::from);
        let templates = store
            .list_templates(namespace.as_ref())
            .context("failed to list templates")?;

        let report = build_report(store, &templates)?;
        if self.json {
            print_json(report)?;
            return Ok(());
        }

        print_table(report);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct TemplateStatus {
    key: ObjectKey,
    value: bool,
    signal: DriftSignal,
    detail: String,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct StatusReport {
    namespace_count: usize,
    drifted_count: usize,
    templates: Vec<TemplateStatus>,
}

#[derive(Serialize)]
struct StatusReportJson {
    summary: StatusSummaryJson,
    templates: Vec<TemplateStatusJson>,
}

#[derive(Serialize)]
struct StatusSummaryJson {
    namespaces: usize,
    templates: usize,
    drifted: usize,
}

#[derive(Serialize)]
struct TemplateStatusJson {
    namespace: String,
    template: String,
    disable_automated_clean: bool,
    status: String,
    detail: String,
    drifted_instances: Vec<String>,
    created_at: Option<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "template")]
    template: String,
    #[tabled(rename = "disableAutomatedClean")]
    value: bool,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn build_report(store: &FileStore, templates: &[Template]) -> Result<StatusReport> {
    let mut rows = Vec::new();
    for template in templates {
        let key = template.key();
        let signal =
            check(store, &key).with_context(|| format!("status check failed for '{key}'"))?;
        rows.push(TemplateStatus {
            detail: signal_detail(&signal),
            value: template.spec.disable_automated_clean,
            created_at: template.metadata.creation_timestamp,
            key,
            signal,
        });
    }

    let namespace_count = rows
        .iter()
        .map(|r| r.key.namespace.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    let drifted_count = rows.iter().filter(|r| r.signal.needs_reconcile()).count();

    Ok(StatusReport {
        namespace_count,
        drifted_count,
        templates: rows,
    })
}

fn print_json(report: StatusReport) -> Result<()> {
    let payload = StatusReportJson {
        summary: StatusSummaryJson {
            namespaces: report.namespace_count,
            templates: report.templates.len(),
            drifted: report.drifted_count,
        },
        templates: report
            .templates
            .into_iter()
            .map(|row| TemplateStatusJson {
                namespace: row.key.namespace.0.clone(),
                template: row.key.name.0.clone(),
                disable_automated_clean: row.value,
                status: row.signal.key().to_string(),
                drifted_instances: match &row.signal {
                    DriftSignal::Drifted { instances } => {
                        instances.iter().map(|k| k.name.0.clone()).collect()
                    }
                    _ => Vec::new(),
                },
                detail: row.detail,
                created_at: row.created_at.map(|t| t.to_rfc3339()),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(report: StatusReport) {
    println!(
        "clonesync v{} | {} namespaces | {} templates | {} drifted",
        env!("CARGO_PKG_VERSION"),
        report.namespace_count,
        report.templates.len(),
        report.drifted_count,
    );

    if report.templates.is_empty() {
        println!("No templates found.");
        return;
    }

    let separator = "■".repeat(67).bright_black().to_string();
    let mut grouped = BTreeMap::<String, Vec<TemplateStatus>>::new();
    for row in report.templates {
        grouped.entry(row.key.namespace.0.clone()).or_default().push(row);
    }

    println!("{separator}");
    println!(
        "Indicators: {} IN SYNC  {} DRIFTED  {} NO INSTANCES",
        signal_indicator(&DriftSignal::InSync { matched: 0 }),
        signal_indicator(&DriftSignal::Drifted {
            instances: Vec::new()
        }),
        signal_indicator(&DriftSignal::NoInstances),
    );
    println!("{separator}");
    for (namespace, rows) in grouped {
        println!("{}", namespace.to_uppercase().bold());
        let table_rows: Vec<StatusTableRow> = rows
            .into_iter()
            .map(|row| StatusTableRow {
                template: row.key.name.0,
                value: row.value,
                status: format!("{} {}", signal_indicator(&row.signal), signal_label(&row.signal)),
                detail: row.detail,
            })
            .collect();
        let mut table = Table::new(table_rows);
        table.with(Style::rounded());
        println!("{table}");
        println!("{separator}");
    }

    if report.drifted_count > 0 {
        println!("Run 'clonesync reconcile --all' to bring drifted machines in line.");
    }
}

fn signal_label(signal: &DriftSignal) -> &'static str {
    match signal {
        DriftSignal::TemplateGone => "GONE",
        DriftSignal::NoInstances => "NO INSTANCES",
        DriftSignal::InSync { .. } => "IN SYNC",
        DriftSignal::Drifted { .. } => "DRIFTED",
    }
}

fn signal_indicator(signal: &DriftSignal) -> String {
    match signal {
        DriftSignal::TemplateGone => "■".red().bold().to_string(),
        DriftSignal::NoInstances => "■".bright_black().bold().to_string(),
        DriftSignal::InSync { .. } => "■".green().bold().to_string(),
        DriftSignal::Drifted { .. } => "■".yellow().bold().to_string(),
    }
}

fn signal_detail(signal: &DriftSignal) -> String {
    match signal {
        DriftSignal::TemplateGone => "deleted while listing".to_string(),
        DriftSignal::NoInstances => "no machines cloned from this template".to_string(),
        DriftSignal::InSync { matched } => format!("{matched} machine(s) up to date"),
        DriftSignal::Drifted { instances } => format!("{} out of date", summarize(instances)),
    }
}

fn summarize(keys: &[ObjectKey]) -> String {
    let mut names: Vec<String> = keys.iter().take(2).map(|k| k.name.0.clone()).collect();
    if keys.len() > names.len() {
        names.push(format!("+{} more", keys.len() - names.len()));
    }
    names.join(", ")
}
