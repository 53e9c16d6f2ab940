use std::collections::{HashMap, HashSet};
use std::fs;
use std::future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use clonesync_core::{FileStore, ObjectClass, ObjectKey};
use clonesync_sync::{
    pipeline::{self, ReconcileScope},
    ReconcileReport,
};

use crate::error::{io_err, DaemonError};
use crate::paths::{DEBOUNCE_WINDOW, JOB_QUEUE_DEPTH};

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReconcileTarget {
    All,
    Template(ObjectKey),
}

impl ReconcileTarget {
    fn scope(&self) -> ReconcileScope {
        match self {
            ReconcileTarget::All => ReconcileScope::All,
            ReconcileTarget::Template(key) => ReconcileScope::Template(key.clone()),
        }
    }

    fn label(&self) -> String {
        match self {
            ReconcileTarget::All => "all".to_string(),
            ReconcileTarget::Template(key) => key.to_string(),
        }
    }
}

struct ReconcileJob {
    target: ReconcileTarget,
    source: &'static str,
    respond_to: oneshot::Sender<Result<ReconcileSummary, String>>,
}

#[derive(Debug, Clone)]
pub struct ReconcileSummary {
    pub target: String,
    pub source: String,
    pub templates: Vec<String>,
    pub matched: usize,
    pub patched: usize,
    pub unchanged: usize,
    pub duration_ms: u128,
}

/// Start the watch loop and block the current thread until it exits.
pub fn start_blocking(root: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(root.to_path_buf()))
}

/// Run the watch loop.
///
/// Reconciles every template once at startup, then again whenever a
/// template or cloned instance file changes under `root`.
pub async fn run(root: PathBuf) -> Result<(), DaemonError> {
    let namespaces = FileStore::at(&root).namespaces_root();
    if !namespaces.exists() {
        fs::create_dir_all(&namespaces).map_err(|e| io_err(&namespaces, e))?;
    }

    // Canonicalize so that FSEvents paths (which arrive as real paths, e.g.
    // /private/var/... on macOS) match the store's own path checks.
    let root = fs::canonicalize(&root).unwrap_or(root);
    let store = FileStore::at(root);
    tracing::info!(root = %store.root().display(), "starting watch loop");

    let (job_tx, job_rx) = mpsc::channel::<ReconcileJob>(JOB_QUEUE_DEPTH);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let store = store.clone();
        tokio::spawn(async move {
            let result = processor_task(store, job_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let store = store.clone();
        tokio::spawn(async move {
            let result = watcher_task(store, job_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down watch loop");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Runtime(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, processor_result, signal_result) =
        tokio::join!(watcher_handle, processor_handle, signal_handle);

    handle_join("watcher", watcher_result)?;
    handle_join("processor", processor_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn watcher_task(
    store: FileStore,
    job_tx: mpsc::Sender<ReconcileJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let namespaces = store.namespaces_root();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut _watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;

    let mut watched_dirs = HashSet::new();
    register_tree(&mut _watcher, &mut watched_dirs, &namespaces)?;

    match enqueue(&job_tx, ReconcileTarget::All, "startup").await {
        Ok(summary) => log_summary(&summary),
        Err(err) => tracing::error!(error = %err, "startup reconcile failed"),
    }

    let mut debounce = Debouncer::new(DEBOUNCE_WINDOW);

    loop {
        let deadline = debounce.next_deadline();
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = wait_until(deadline) => {
                let mut targets: Vec<ReconcileTarget> = Vec::new();
                for path in debounce.take_due(Instant::now()) {
                    if let Some(target) = target_for_path(&store, &path) {
                        if !targets.contains(&target) {
                            targets.push(target);
                        }
                    }
                }
                for target in targets {
                    match enqueue(&job_tx, target, "watcher").await {
                        Ok(summary) => log_summary(&summary),
                        Err(err) => {
                            tracing::error!(error = %err, "watcher-triggered reconcile failed");
                        }
                    }
                }
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                for path in event.paths {
                    // FSEvents is directory-based; always register parent directory.
                    if let Some(watch_dir) = directory_to_watch(&path) {
                        if watch_dir.starts_with(&namespaces) && watch_dir.exists() {
                            register_tree(&mut _watcher, &mut watched_dirs, &watch_dir)?;
                        }
                    }

                    debounce.record(path, Instant::now());
                }
            }
        }
    }

    Ok(())
}

async fn processor_task(
    store: FileStore,
    mut job_rx: mpsc::Receiver<ReconcileJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = job_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let started = Instant::now();

                let scope = job.target.scope();
                let store = store.clone();
                let result = tokio::task::spawn_blocking(move || pipeline::run(&store, scope, false))
                    .await
                    .map_err(|err| DaemonError::Runtime(format!("reconcile task join error: {err}")))?;

                let outcome = result
                    .map(|reports| build_summary(&job.target, job.source, &reports, started.elapsed()))
                    .map_err(|err| err.to_string());
                let _ = job.respond_to.send(outcome);
            }
        }
    }

    Ok(())
}

async fn enqueue(
    job_tx: &mpsc::Sender<ReconcileJob>,
    target: ReconcileTarget,
    source: &'static str,
) -> Result<ReconcileSummary, DaemonError> {
    let (respond_to, response) = oneshot::channel();
    job_tx
        .send(ReconcileJob {
            target,
            source,
            respond_to,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("reconcile job queue"))?;
    response
        .await
        .map_err(|_| DaemonError::ChannelClosed("reconcile job response"))?
        .map_err(DaemonError::Runtime)
}

fn build_summary(
    target: &ReconcileTarget,
    source: &str,
    reports: &[ReconcileReport],
    elapsed: Duration,
) -> ReconcileSummary {
    ReconcileSummary {
        target: target.label(),
        source: source.to_string(),
        templates: reports.iter().map(|r| r.template.to_string()).collect(),
        matched: reports.iter().map(|r| r.matched.len()).sum(),
        patched: reports.iter().map(ReconcileReport::changed).sum(),
        unchanged: reports.iter().map(ReconcileReport::unchanged).sum(),
        duration_ms: elapsed.as_millis(),
    }
}

fn log_summary(summary: &ReconcileSummary) {
    tracing::info!(
        reconcile_target = %summary.target,
        source = %summary.source,
        templates = summary.templates.len(),
        matched = summary.matched,
        patched = summary.patched,
        duration_ms = summary.duration_ms,
        "reconcile completed",
    );
}

/// Which template a changed file should trigger.
///
/// Template files map to themselves; instance files map to the template
/// named by their lineage. Anything else is ignored.
fn target_for_path(store: &FileStore, path: &Path) -> Option<ReconcileTarget> {
    match store.classify_path(path)? {
        (ObjectClass::Template, key) => Some(ReconcileTarget::Template(key)),
        (ObjectClass::Instance, key) => {
            let instance = match store.load_instance(&key) {
                Ok(instance) => instance,
                Err(err) => {
                    tracing::debug!(instance = %key, error = %err, "skipping unreadable instance");
                    return None;
                }
            };
            let lineage = instance.lineage()?;
            Some(ReconcileTarget::Template(ObjectKey::new(
                key.namespace,
                lineage.source_name,
            )))
        }
    }
}

fn register_tree(
    watcher: &mut RecommendedWatcher,
    watched_dirs: &mut HashSet<PathBuf>,
    root: &Path,
) -> Result<(), DaemonError> {
    for dir in collect_dirs(root)? {
        let canonical = match fs::canonicalize(&dir) {
            Ok(path) => path,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&dir, err)),
        };
        if watched_dirs.insert(canonical.clone()) {
            watcher.watch(&canonical, RecursiveMode::NonRecursive)?;
            tracing::debug!(path = %canonical.display(), "watching store directory");
        }
    }
    Ok(())
}

fn collect_dirs(root: &Path) -> Result<Vec<PathBuf>, DaemonError> {
    let mut dirs = vec![root.to_path_buf()];
    let mut cursor = 0;
    while cursor < dirs.len() {
        let current = dirs[cursor].clone();
        cursor += 1;
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&current, err)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&current, e))?;
            let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            if ty.is_dir() {
                dirs.push(entry.path());
            }
        }
    }
    dirs.sort();
    dirs.dedup();
    Ok(dirs)
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn directory_to_watch(path: &Path) -> Option<PathBuf> {
    if path.is_dir() {
        Some(path.to_path_buf())
    } else {
        path.parent().map(Path::to_path_buf)
    }
}

/// Trailing-edge debounce: a path fires once it has been quiet for `window`.
///
/// Every event pushes the path's deadline out again, so the last write of a
/// burst is always the one that gets reconciled.
#[derive(Debug)]
struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    fn record(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path, now + self.window);
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Remove and return every path whose quiet period has elapsed, sorted.
    fn take_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        due.sort();
        for path in &due {
            self.pending.remove(path);
        }
        due
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Runtime(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn init_tracing() {
    init_tracing_with("info");
}

/// Install the stderr fmt subscriber; `RUST_LOG` overrides `default_directive`.
pub fn init_tracing_with(default_directive: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
