//! `clonesync watch`: run the reconcile loop in the foreground.

use anyhow::{Context, Result};

use clonesync_core::FileStore;

pub fn run(store: &FileStore) -> Result<()> {
    clonesync_daemon::start_blocking(store.root()).context("watch loop exited with error")
}
