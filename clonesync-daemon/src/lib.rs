//! Watch loop: file watcher + reconcile processor over a [`FileStore`] root.
//!
//! [`FileStore`]: clonesync_core::FileStore

mod error;
pub mod paths;
mod runtime;

pub use error::DaemonError;
pub use runtime::{init_tracing_with, run, start_blocking, ReconcileSummary};
