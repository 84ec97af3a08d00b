use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;

use super::{FileSyncEngine, FsEventKind, SourceWatch, SyncAction, WatchChannel};
use crate::{
    context::ProjectContext,
    error::SyncError,
    event::{ChangeReason, ReportLevel},
    paths::normalize_path,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemountOutcome {
    /// Tracked paths did not change; nothing was touched
    Unchanged,
    Remounted {
        added: Vec<PathBuf>,
        removed: Vec<PathBuf>,
    },
}

/// Reacts to changes of the project property file.
#[derive(Clone)]
pub struct ConfigSyncEngine {
    ctx: ProjectContext,
    files: FileSyncEngine,
    watch: Option<Arc<dyn SourceWatch>>,
    remount: Arc<Mutex<()>>,
}

impl ConfigSyncEngine {
    pub fn new(files: FileSyncEngine, watch: Option<Arc<dyn SourceWatch>>) -> Self {
        ConfigSyncEngine {
            ctx: files.context().clone(),
            files,
            watch,
            remount: Arc::new(Mutex::new(())),
        }
    }

    /// Reload the property file and remount if the tracked roots changed.
    ///
    /// The whole snapshot, reload, compare and remount sequence runs under one lock, so
    /// concurrent calls cannot interleave. A source that fails to load is returned as an
    /// error and leaves the live configuration untouched.
    pub async fn update_config(&self) -> Result<RemountOutcome, SyncError> {
        let _remounting = self.remount.lock().await;

        let (old_paths, old_files, source) = {
            let config = self.ctx.config.read();
            (config.tracked_paths(), config.hardware_files(), config.source())
        };
        let raw = source.raw_project_info()?;
        let new_paths = {
            let mut config = self.ctx.config.write();
            config.merge(&raw);
            config.tracked_paths()
        };
        if new_paths == old_paths {
            tracing::debug!("[ConfigSyncEngine] tracked paths unchanged");
            return Ok(RemountOutcome::Unchanged);
        }

        tracing::info!(
            "[ConfigSyncEngine] tracked paths changed, remounting: {:?}",
            new_paths
        );
        if let Some(watch) = self.watch.as_ref() {
            if let Err(e) = watch.rewatch(&new_paths) {
                self.ctx.notifier.report(ReportLevel::Error, e.to_string());
            }
        }
        let new_files = self.ctx.config.read().hardware_files();

        let added = new_files
            .difference(&old_files)
            .cloned()
            .collect::<Vec<_>>();
        let removed = old_files
            .difference(&new_files)
            .cloned()
            .collect::<Vec<_>>();
        for path in added.iter() {
            if let Err(e) = self.files.populate(path).await {
                self.files.settle::<()>(Err(e));
            }
        }
        {
            let mut graph = self.ctx.graph.write();
            for path in removed.iter() {
                graph.delete_file(path);
            }
        }

        match self.ctx.build_tool.get() {
            Some(tool) => {
                let (add_result, del_result) = tokio::join!(
                    tool.add_files(added.clone()),
                    tool.del_files(removed.clone())
                );
                for result in [add_result, del_result] {
                    let error = match result {
                        Ok(()) => continue,
                        Err(e @ SyncError::BuildTool(_)) => e,
                        Err(e) => SyncError::BuildTool(format!(
                            "{} failed to sync files: {e}",
                            tool.name()
                        )),
                    };
                    self.ctx.notifier.report(ReportLevel::Error, error.to_string());
                }
            }
            None => {
                self.ctx
                    .notifier
                    .report(ReportLevel::Warn, SyncError::MissingIntegration.to_string());
            }
        }

        tracing::info!(
            "[ConfigSyncEngine] remounted: {} added, {} removed",
            added.len(),
            removed.len()
        );
        self.ctx
            .notifier
            .signal(ChangeReason::Remounted(added.len(), removed.len()));
        Ok(RemountOutcome::Remounted { added, removed })
    }

    async fn on_any(&self, path: &Path) {
        tracing::debug!("[ConfigSyncEngine] config event for {:?}", path);
        if let Err(e) = self.update_config().await {
            self.ctx.notifier.report(
                ReportLevel::Error,
                format!("Project config was not applied: {e}"),
            );
        }
    }
}

impl SyncAction for ConfigSyncEngine {
    fn select_watcher(&self) -> WatchChannel {
        WatchChannel::Config
    }

    fn accepts(&self, kind: FsEventKind, path: &Path) -> bool {
        match kind {
            FsEventKind::Add | FsEventKind::Change | FsEventKind::Unlink => {
                match self.ctx.config.read().config_path() {
                    Some(config_path) => normalize_path(path) == config_path,
                    None => true,
                }
            }
            FsEventKind::AddDir | FsEventKind::UnlinkDir => false,
        }
    }

    async fn on_add(&self, path: &Path) {
        self.on_any(path).await
    }

    async fn on_change(&self, path: &Path) {
        self.on_any(path).await
    }

    async fn on_unlink(&self, path: &Path) {
        self.on_any(path).await
    }
}
