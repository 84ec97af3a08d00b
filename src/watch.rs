//! # Monitor Service - file watching for an open project
//!
//! [`MonitorService`] owns two debounced file watchers and the sync engines that react
//! to them:
//!
//! - the **source watcher** recursively watches every root in the project's tracked
//!   path set and feeds [`FileSyncEngine`](crate::sync::FileSyncEngine);
//! - the **config watcher** watches the directory holding the project property file and
//!   feeds [`ConfigSyncEngine`](crate::sync::ConfigSyncEngine), which may in turn rebuild
//!   the source watcher when the tracked roots change.
//!
//! ## Threading Model
//!
//! Watcher callbacks run on the debouncer threads. They only translate notify events
//! into [`WatchEvent`]s and push them onto one unbounded queue. A single consumer task
//! on the service's runtime drains that queue and dispatches each event to completion
//! before taking the next, so graph mutations are applied strictly in arrival order and
//! a remount can never interleave with a file update.
//!
//! Explicit reloads through [`MonitorService::update_config`] and watcher failures travel
//! the same queue. Failures become error reports on the project's notifier.
//!
//! Events produced by the previous source watcher that are still queued when a remount
//! finishes are dispatched normally; the engines drop those whose path is no longer
//! under a tracked root.
//!
//! A tracked root that does not exist yet is waited for through its nearest existing
//! ancestor. When it appears the source watcher is rebuilt and its content is added.
//!
//! ```rust,no_run
//! use hdl_sync::{config::MonitorSettings, context::ProjectContext, watch::MonitorService};
//! use std::path::Path;
//!
//! let ctx = ProjectContext::open(Path::new("/path/to/project"), None)?;
//! let events = ctx.notifier.subscribe();
//! let _service = MonitorService::new(ctx, MonitorSettings::default())?;
//! for event in events {
//!     println!("{event}");
//! }
//! # Ok::<(), hdl_sync::SyncError>(())
//! ```
//!
//! This module requires the `service` feature flag.

use notify_debouncer_full::{
    new_debouncer,
    notify::{
        event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
        EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    },
    DebounceEventResult, Debouncer, FileIdMap,
};
use parking_lot::Mutex;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    runtime::Runtime,
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    task::JoinHandle,
};

use crate::{
    config::{MonitorSettings, TrackedPathSet},
    context::ProjectContext,
    error::SyncError,
    event::{Notifier, ReportLevel},
    paths::{is_hdl_file, is_under, normalize_path},
    sync::{
        ConfigSyncEngine, FileSyncEngine, FsEventKind, RemountOutcome, SourceWatch,
        SyncDispatcher, WatchChannel, WatchEvent,
    },
};

type ProjectWatcher = Debouncer<RecommendedWatcher, FileIdMap>;

/// Unit of work on the mutation queue.
enum Work {
    Event(WatchEvent),
    /// Reload the property file; answered with the remount outcome
    Remount(oneshot::Sender<Result<RemountOutcome, SyncError>>),
    /// Watcher failure to surface as a report
    Failure(String),
    /// Answered once everything queued before it has been dispatched
    Barrier(oneshot::Sender<()>),
}

/// Translate one debounced notify event into watch events for `channel`.
pub fn translate(channel: WatchChannel, kind: &EventKind, paths: &[PathBuf]) -> Vec<WatchEvent> {
    let event = |kind: FsEventKind, path: &PathBuf| WatchEvent::new(channel, kind, path);
    let appeared = |path: &PathBuf| {
        if path.is_dir() {
            event(FsEventKind::AddDir, path)
        } else {
            event(FsEventKind::Add, path)
        }
    };
    // A removed path can no longer be inspected; anything without an HDL extension is
    // treated as a directory.
    let vanished = |path: &PathBuf| {
        if is_hdl_file(path) {
            event(FsEventKind::Unlink, path)
        } else {
            event(FsEventKind::UnlinkDir, path)
        }
    };

    match kind {
        EventKind::Create(CreateKind::Folder) => paths
            .iter()
            .map(|p| event(FsEventKind::AddDir, p))
            .collect(),
        EventKind::Create(_) => paths.iter().map(appeared).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            vec![vanished(&paths[0]), appeared(&paths[1])]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.iter().map(vanished).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.iter().map(appeared).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .map(|p| if p.exists() { appeared(p) } else { vanished(p) })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => paths
            .iter()
            .filter(|p| !p.is_dir())
            .map(|p| event(FsEventKind::Change, p))
            .collect(),
        EventKind::Remove(RemoveKind::Folder) => paths
            .iter()
            .map(|p| event(FsEventKind::UnlinkDir, p))
            .collect(),
        EventKind::Remove(_) => paths.iter().map(vanished).collect(),
        _ => Vec::new(),
    }
}

/// Push the outcome of one debouncer callback onto the queue. Returns false once the
/// queue is closed.
fn forward(
    channel: WatchChannel,
    result: DebounceEventResult,
    tx: &UnboundedSender<Work>,
) -> bool {
    let work = match result {
        Ok(events) => events
            .iter()
            .flat_map(|event| translate(channel, &event.event.kind, &event.event.paths))
            .map(Work::Event)
            .collect::<Vec<_>>(),
        Err(errors) => errors
            .into_iter()
            .map(|error| {
                let error = SyncError::from(error);
                tracing::error!("[{:?} watcher] {error}", channel);
                Work::Failure(format!("{channel:?} watcher failed: {error}"))
            })
            .collect(),
    };
    for item in work {
        if tx.send(item).is_err() {
            tracing::debug!("[{:?} watcher] queue closed", channel);
            return false;
        }
    }
    true
}

fn new_watcher(
    channel: WatchChannel,
    debounce: Duration,
    tx: UnboundedSender<Work>,
) -> Result<ProjectWatcher, SyncError> {
    let debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
        forward(channel, result, &tx);
    })?;
    Ok(debouncer)
}

fn nearest_existing_dir(path: &Path) -> Option<&Path> {
    path.ancestors().skip(1).find(|ancestor| ancestor.is_dir())
}

/// The source-tree watcher. Rebuilt as a whole on every remount.
///
/// Roots that do not exist yet are waited for: their nearest existing ancestor is
/// watched non-recursively, and [`SourceWatcher::revive`] rebuilds the watcher once a
/// directory on the way to a missing root appears.
pub struct SourceWatcher {
    debounce: Duration,
    tx: UnboundedSender<Work>,
    watcher: Mutex<Option<ProjectWatcher>>,
    roots: Mutex<TrackedPathSet>,
    missing: Mutex<TrackedPathSet>,
}

impl SourceWatcher {
    fn new(debounce: Duration, tx: UnboundedSender<Work>) -> Self {
        SourceWatcher {
            debounce,
            tx,
            watcher: Mutex::new(None),
            roots: Mutex::new(TrackedPathSet::new()),
            missing: Mutex::new(TrackedPathSet::new()),
        }
    }

    /// Roots being waited for.
    pub fn missing_roots(&self) -> TrackedPathSet {
        self.missing.lock().clone()
    }

    /// React to `created`, a directory that just appeared. If it lies on the way to a
    /// missing root the watcher is rebuilt, and the missing roots that now exist are
    /// returned so their content can be added.
    pub fn revive(&self, created: &Path) -> Result<Vec<PathBuf>, SyncError> {
        let created = normalize_path(created);
        let advanced = self
            .missing
            .lock()
            .iter()
            .filter(|root| root.starts_with(&created))
            .cloned()
            .collect::<Vec<_>>();
        if advanced.is_empty() {
            return Ok(Vec::new());
        }
        let roots = self.roots.lock().clone();
        self.rewatch(&roots)?;
        Ok(advanced.into_iter().filter(|root| root.is_dir()).collect())
    }
}

impl SourceWatch for SourceWatcher {
    fn rewatch(&self, roots: &TrackedPathSet) -> Result<(), SyncError> {
        let mut watcher = new_watcher(WatchChannel::Source, self.debounce, self.tx.clone())?;
        let (present, missing): (Vec<&PathBuf>, Vec<&PathBuf>) =
            roots.iter().partition(|root| root.is_dir());
        for root in present.iter() {
            watcher.watcher().watch(root, RecursiveMode::Recursive)?;
        }

        let mut parents = BTreeSet::new();
        for root in missing.iter() {
            match nearest_existing_dir(root) {
                Some(parent) if !is_under(parent, present.iter().copied()) => {
                    parents.insert(parent.to_path_buf());
                }
                Some(_) => {}
                None => tracing::warn!("[SourceWatcher] no existing ancestor for {:?}", root),
            }
        }
        for parent in parents.iter() {
            tracing::debug!("[SourceWatcher] waiting for missing roots under {:?}", parent);
            watcher.watcher().watch(parent, RecursiveMode::NonRecursive)?;
        }

        *self.roots.lock() = roots.clone();
        *self.missing.lock() = missing.into_iter().cloned().collect();
        let previous = self.watcher.lock().replace(watcher);
        drop(previous);
        tracing::info!(
            "[SourceWatcher] watching {} roots, {} missing",
            present.len(),
            roots.len() - present.len()
        );
        Ok(())
    }
}

/// State of the single task that applies queued work.
struct Consumer {
    dispatcher: SyncDispatcher,
    source: Arc<SourceWatcher>,
    notifier: Arc<Notifier>,
}

impl Consumer {
    async fn run(self, mut rx: UnboundedReceiver<Work>) {
        tracing::debug!("[MonitorService] consumer started");
        while let Some(work) = rx.recv().await {
            self.process(work).await;
        }
        tracing::debug!("[MonitorService] consumer stopped");
    }

    async fn process(&self, work: Work) {
        match work {
            Work::Event(event) => {
                let appeared = if event.channel == WatchChannel::Source
                    && event.kind == FsEventKind::AddDir
                {
                    self.revive(&event.path)
                } else {
                    Vec::new()
                };
                self.dispatcher.dispatch(&event).await;
                for root in appeared.into_iter().filter(|root| *root != event.path) {
                    self.dispatcher
                        .dispatch(&WatchEvent::source(FsEventKind::AddDir, root))
                        .await;
                }
            }
            Work::Remount(done) => {
                let _ = done.send(self.dispatcher.config().update_config().await);
            }
            Work::Failure(message) => self.notifier.report(ReportLevel::Error, message),
            Work::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }

    fn revive(&self, path: &Path) -> Vec<PathBuf> {
        match self.source.revive(path) {
            Ok(appeared) => appeared,
            Err(e) => {
                self.notifier.report(ReportLevel::Error, e.to_string());
                Vec::new()
            }
        }
    }
}

pub struct MonitorService {
    ctx: ProjectContext,
    source: Arc<SourceWatcher>,
    config_watcher: Mutex<Option<ProjectWatcher>>,
    queue: UnboundedSender<Work>,
    consumer: JoinHandle<()>,
    runtime: Runtime,
}

impl MonitorService {
    /// Watch the project, mount it, and start the consumer task.
    #[tracing::instrument(skip_all)]
    pub fn new(ctx: ProjectContext, settings: MonitorSettings) -> Result<Self, SyncError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let (queue, rx) = unbounded_channel::<Work>();

        let source = Arc::new(SourceWatcher::new(settings.debounce(), queue.clone()));
        let files = FileSyncEngine::new(ctx.clone());
        let config = ConfigSyncEngine::new(
            files.clone(),
            Some(source.clone() as Arc<dyn SourceWatch>),
        );
        let dispatcher = SyncDispatcher::new(files.clone(), config);

        // Watch before mounting: an add seen twice is harmless, one never seen is not.
        let roots = ctx.config.read().tracked_paths();
        source.rewatch(&roots)?;
        let config_path = ctx.config.read().config_path();
        let config_watcher = match config_path {
            Some(config_path) => Some(Self::watch_config(
                &config_path,
                settings.debounce(),
                queue.clone(),
            )?),
            None => None,
        };
        let mounted = runtime.block_on(files.mount());
        tracing::info!("[MonitorService] mounted {mounted} files");

        let consumer = Consumer {
            dispatcher,
            source: source.clone(),
            notifier: ctx.notifier.clone(),
        };
        let consumer = runtime.spawn(consumer.run(rx));

        Ok(MonitorService {
            ctx,
            source,
            config_watcher: Mutex::new(config_watcher),
            queue,
            consumer,
            runtime,
        })
    }

    /// Watch the directory holding the property file, which need not exist yet.
    fn watch_config(
        config_path: &Path,
        debounce: Duration,
        tx: UnboundedSender<Work>,
    ) -> Result<ProjectWatcher, SyncError> {
        let dir = config_path
            .parent()
            .ok_or_else(|| SyncError::WatcherSetup(format!("{config_path:?} has no parent")))?;
        let mut watcher = new_watcher(WatchChannel::Config, debounce, tx)?;
        watcher.watcher().watch(dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }

    pub fn context(&self) -> &ProjectContext {
        &self.ctx
    }

    fn enqueue(&self, work: Work) -> Result<(), SyncError> {
        self.queue
            .send(work)
            .map_err(|_| SyncError::Channel("mutation queue closed".to_string()))
    }

    /// Queue an event as if a watcher had produced it.
    pub fn submit(&self, event: WatchEvent) -> Result<(), SyncError> {
        self.enqueue(Work::Event(event))
    }

    /// Block until every event queued so far has been dispatched.
    pub fn settle(&self) -> Result<(), SyncError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.enqueue(Work::Barrier(done_tx))?;
        self.runtime
            .block_on(done_rx)
            .map_err(|e| SyncError::Channel(format!("consumer stopped: {e}")))
    }

    /// Re-read the property file now. The reload is queued like any watcher event, so it
    /// runs after everything already queued and nothing queued later interleaves with it.
    pub fn update_config(&self) -> Result<RemountOutcome, SyncError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.enqueue(Work::Remount(done_tx))?;
        self.runtime
            .block_on(done_rx)
            .map_err(|e| SyncError::Channel(format!("consumer stopped: {e}")))?
    }

    /// Currently watched source roots.
    pub fn watched_roots(&self) -> TrackedPathSet {
        self.ctx.config.read().tracked_paths()
    }

    /// Tracked roots that do not exist yet.
    pub fn missing_roots(&self) -> TrackedPathSet {
        self.source.missing_roots()
    }

    pub fn is_watching(&self) -> bool {
        self.source.watcher.lock().is_some()
    }
}

impl Drop for MonitorService {
    fn drop(&mut self) {
        self.config_watcher.lock().take();
        self.source.watcher.lock().take();
        self.consumer.abort();
    }
}
