//! Sync engines: turn file system events into project graph mutations.
//!
//! Two engines implement [`SyncAction`]:
//!
//! - [`FileSyncEngine`] handles HDL source files (add, change, unlink, and directory
//!   variants), re-parsing only the affected file and reconciling the result.
//! - [`ConfigSyncEngine`] handles the project property file. A config change that alters
//!   the set of tracked roots remounts the project: the source watch set is rebuilt and
//!   the file list diffed, old against new.
//!
//! The [`SyncDispatcher`] owns one of each and routes [`WatchEvent`]s by channel. It is
//! meant to be driven by a single consumer so that every mutation is applied in arrival
//! order.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    future::Future,
    path::{Path, PathBuf},
};

use crate::{config::TrackedPathSet, error::SyncError};

mod config;
mod file;

#[cfg(test)]
mod tests;

pub use config::{ConfigSyncEngine, RemountOutcome};
pub use file::FileSyncEngine;

/// Which watcher an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchChannel {
    /// HDL sources under the tracked roots
    Source,
    /// The project property file
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FsEventKind {
    Add,
    AddDir,
    Unlink,
    UnlinkDir,
    Change,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub channel: WatchChannel,
    pub kind: FsEventKind,
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn new(channel: WatchChannel, kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        WatchEvent {
            channel,
            kind,
            path: path.into(),
        }
    }

    pub fn source(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        WatchEvent::new(WatchChannel::Source, kind, path)
    }

    pub fn config(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        WatchEvent::new(WatchChannel::Config, kind, path)
    }
}

impl Display for WatchEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{:?}/{:?} {}", self.channel, self.kind, self.path.display())
    }
}

/// Rebuilds the source-tree watcher as a unit.
pub trait SourceWatch: Send + Sync {
    fn rewatch(&self, roots: &TrackedPathSet) -> Result<(), SyncError>;
}

/// Handler set for one watch channel. Handlers never fail: errors are turned into
/// reports on the project's notifier.
pub trait SyncAction: Send + Sync {
    fn select_watcher(&self) -> WatchChannel;

    /// False for events this engine should drop without handling.
    fn accepts(&self, kind: FsEventKind, path: &Path) -> bool;

    fn on_add(&self, path: &Path) -> impl Future<Output = ()> + Send;

    fn on_change(&self, path: &Path) -> impl Future<Output = ()> + Send;

    fn on_unlink(&self, path: &Path) -> impl Future<Output = ()> + Send;

    fn on_add_dir(&self, _path: &Path) -> impl Future<Output = ()> + Send {
        async {}
    }

    fn on_unlink_dir(&self, _path: &Path) -> impl Future<Output = ()> + Send {
        async {}
    }
}

async fn apply<A: SyncAction>(action: &A, kind: FsEventKind, path: &Path) {
    if !action.accepts(kind, path) {
        tracing::trace!(
            "[{:?}] ignoring {:?} for {:?}",
            action.select_watcher(),
            kind,
            path
        );
        return;
    }
    match kind {
        FsEventKind::Add => action.on_add(path).await,
        FsEventKind::AddDir => action.on_add_dir(path).await,
        FsEventKind::Unlink => action.on_unlink(path).await,
        FsEventKind::UnlinkDir => action.on_unlink_dir(path).await,
        FsEventKind::Change => action.on_change(path).await,
    }
}

/// Routes events to the engine selected by their channel.
#[derive(Clone)]
pub struct SyncDispatcher {
    files: FileSyncEngine,
    config: ConfigSyncEngine,
}

impl SyncDispatcher {
    pub fn new(files: FileSyncEngine, config: ConfigSyncEngine) -> Self {
        SyncDispatcher { files, config }
    }

    pub fn files(&self) -> &FileSyncEngine {
        &self.files
    }

    pub fn config(&self) -> &ConfigSyncEngine {
        &self.config
    }

    pub async fn dispatch(&self, event: &WatchEvent) {
        tracing::debug!("[SyncDispatcher] {event}");
        if event.channel == self.files.select_watcher() {
            apply(&self.files, event.kind, &event.path).await;
        } else {
            apply(&self.config, event.kind, &event.path).await;
        }
    }
}
