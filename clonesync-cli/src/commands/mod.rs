pub mod diff;
pub mod reconcile;
pub mod status;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};

use clonesync_core::FileStore;

/// `--root` / `CLONESYNC_ROOT` if given, `~/.clonesync` otherwise.
pub fn open_store(root: Option<PathBuf>) -> Result<FileStore> {
    match root {
        Some(root) => Ok(FileStore::at(root)),
        None => FileStore::from_home().context("could not determine store root"),
    }
}
