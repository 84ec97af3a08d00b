use std::path::{Path, PathBuf};

use super::{FsEventKind, SyncAction, WatchChannel};
use crate::{
    context::ProjectContext,
    error::SyncError,
    event::{ChangeReason, ReportLevel},
    parser::LanguageId,
    paths::{collect_hdl_files, is_hdl_file, normalize_path},
};

/// Keeps the project graph in step with HDL source files.
#[derive(Clone)]
pub struct FileSyncEngine {
    ctx: ProjectContext,
}

impl FileSyncEngine {
    pub fn new(ctx: ProjectContext) -> Self {
        FileSyncEngine { ctx }
    }

    pub fn context(&self) -> &ProjectContext {
        &self.ctx
    }

    /// Register a new file and populate it from a full parse.
    ///
    /// If the full parse fails the file stays registered with no modules, and the
    /// failure is returned for reporting.
    pub async fn add(&self, path: &Path) -> Result<(), SyncError> {
        let path = normalize_path(path);
        let populated = self.populate(&path).await;
        self.ctx
            .notifier
            .signal(ChangeReason::FileAdded(path.clone()));
        populated
    }

    /// Re-parse a tracked file and reconcile the result.
    ///
    /// Untracked paths are rejected with [`SyncError::UntrackedPath`]. A failed fast parse
    /// leaves the graph exactly as it was.
    pub async fn change(&self, path: &Path) -> Result<(), SyncError> {
        let path = normalize_path(path);
        if !self.ctx.graph.read().contains_file(&path) {
            return Err(SyncError::UntrackedPath(path.display().to_string()));
        }
        let Some(parsed) = self.ctx.parsers.parse_fast(&path).await else {
            return Err(SyncError::ParseFailure(format!(
                "{}, the project graph was not updated",
                path.display()
            )));
        };
        let report = self.ctx.graph.write().reconcile(&path, &parsed);
        tracing::debug!(
            "[FileSyncEngine] {:?}: created {:?}, updated {:?}, deleted {:?}",
            path,
            report.created,
            report.updated,
            report.deleted
        );
        self.ctx
            .notifier
            .signal(ChangeReason::FileUpdated(path.clone()));
        Ok(())
    }

    pub async fn unlink(&self, path: &Path) -> Result<(), SyncError> {
        let path = normalize_path(path);
        if !self.ctx.graph.write().delete_file(&path) {
            tracing::debug!("[FileSyncEngine] unlink: {:?} was not tracked", path);
        }
        self.ctx
            .notifier
            .signal(ChangeReason::FileRemoved(path.clone()));
        Ok(())
    }

    /// Add every HDL file below `dir` that is not tracked yet. Returns how many were added.
    pub async fn add_dir(&self, dir: &Path) -> Result<usize, SyncError> {
        let dir = normalize_path(dir);
        let found = collect_hdl_files([&dir]);
        let mut added = 0;
        for path in found.iter() {
            if self.ctx.graph.read().contains_file(path) {
                continue;
            }
            self.settle(self.add(path).await);
            added += 1;
        }
        Ok(added)
    }

    /// Unlink every tracked file below `dir`. Returns how many were removed.
    pub async fn unlink_dir(&self, dir: &Path) -> Result<usize, SyncError> {
        let dir = normalize_path(dir);
        let tracked = self.ctx.graph.read().files_under(&dir);
        for path in tracked.iter() {
            self.unlink(path).await?;
        }
        Ok(tracked.len())
    }

    /// Populate the graph with every HDL file under the tracked roots.
    pub async fn mount(&self) -> usize {
        let files = self.ctx.config.read().hardware_files();
        tracing::info!("[FileSyncEngine] mounting {} files", files.len());
        for path in files.iter() {
            if let Err(e) = self.populate(path).await {
                self.settle::<()>(Err(e));
            }
        }
        self.ctx.notifier.signal(ChangeReason::Mounted(files.len()));
        files.len()
    }

    /// `create_file`, then fill modules, macros and diagnostics from a full parse. `path`
    /// must already be normalized.
    pub(crate) async fn populate(&self, path: &Path) -> Result<(), SyncError> {
        let language = LanguageId::from_path(path)
            .ok_or_else(|| SyncError::UntrackedPath(path.display().to_string()))?;
        self.ctx.graph.write().create_file(path, language);

        let Some(full) = self.ctx.parsers.parse_full(path).await else {
            return Err(SyncError::ParseFailure(format!(
                "{}, registered without modules",
                path.display()
            )));
        };
        let skeleton = full.skeleton();
        let mut graph = self.ctx.graph.write();
        let report = graph.reconcile(path, &skeleton);
        if !full.content.errors.is_empty() {
            tracing::warn!(
                "[FileSyncEngine] {:?} has {} diagnostics",
                path,
                full.content.errors.len()
            );
        }
        graph.set_diagnostics(path, full.content.errors);
        tracing::debug!(
            "[FileSyncEngine] populated {:?} with {} modules",
            path,
            report.created.len()
        );
        Ok(())
    }

    /// Turn a handler result into a user-facing report.
    pub(crate) fn settle<T>(&self, result: Result<T, SyncError>) {
        match result {
            Ok(_) => {}
            Err(e) if e.is_silent() => tracing::debug!("[FileSyncEngine] {e}"),
            Err(e) => self.ctx.notifier.report(ReportLevel::Error, e.to_string()),
        }
    }

    fn is_tracked(&self, path: &Path) -> bool {
        let path: PathBuf = normalize_path(path);
        self.ctx.config.read().is_tracked(&path)
    }
}

impl SyncAction for FileSyncEngine {
    fn select_watcher(&self) -> WatchChannel {
        WatchChannel::Source
    }

    fn accepts(&self, kind: FsEventKind, path: &Path) -> bool {
        match kind {
            FsEventKind::Add | FsEventKind::Change => is_hdl_file(path) && self.is_tracked(path),
            FsEventKind::Unlink => is_hdl_file(path),
            FsEventKind::AddDir => self.is_tracked(path),
            FsEventKind::UnlinkDir => true,
        }
    }

    async fn on_add(&self, path: &Path) {
        self.settle(self.add(path).await);
    }

    async fn on_change(&self, path: &Path) {
        self.settle(self.change(path).await);
    }

    async fn on_unlink(&self, path: &Path) {
        self.settle(self.unlink(path).await);
    }

    async fn on_add_dir(&self, path: &Path) {
        self.settle(self.add_dir(path).await);
    }

    async fn on_unlink_dir(&self, path: &Path) {
        self.settle(self.unlink_dir(path).await);
    }
}
