//! clonesync: keep cloned machines in step with their machine template.
//!
//! # Usage
//!
//! ```text
//! clonesync [--root <dir>] reconcile <namespace>/<template> [--dry-run] [--json]
//! clonesync [--root <dir>] reconcile --all [--namespace <ns>] [--dry-run] [--json]
//! clonesync [--root <dir>] status [--namespace <ns>] [--json]
//! clonesync [--root <dir>] diff <namespace>/<template>
//! clonesync [--root <dir>] watch
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{diff::DiffArgs, reconcile::ReconcileArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "clonesync",
    version,
    about = "Propagate machine template settings to the machines cloned from it",
    long_about = None,
)]
struct Cli {
    /// Object store root (defaults to ~/.clonesync).
    #[arg(long, global = true, env = "CLONESYNC_ROOT")]
    root: Option<PathBuf>,

    /// Log reconcile progress to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy template settings onto every machine cloned from it.
    Reconcile(ReconcileArgs),

    /// Show which templates have drifted clones.
    Status(StatusArgs),

    /// Show unified diff of what reconcile would change for a template.
    Diff(DiffArgs),

    /// Watch the store and reconcile on every change (foreground).
    Watch,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_directive = match (&cli.command, cli.verbose) {
        (Commands::Watch, _) | (_, true) => "info",
        _ => "warn",
    };
    clonesync_daemon::init_tracing_with(default_directive);

    let store = commands::open_store(cli.root)?;
    match cli.command {
        Commands::Reconcile(args) => args.run(&store),
        Commands::Status(args) => args.run(&store),
        Commands::Diff(args) => args.run(&store),
        Commands::Watch => commands::watch::run(&store),
    }
}
