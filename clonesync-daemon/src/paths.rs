use std::time::Duration;

/// A path is reconciled once it has seen no events for this long.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Capacity of the watcher → processor job queue.
pub const JOB_QUEUE_DEPTH: usize = 64;
