//! Build-tool integration seam.
//!
//! A [`BuildTool`] mirrors the project's file list into an external tool (a vendor
//! project, a simulator script). It is optional: the [`BuildToolSlot`] may be empty, in
//! which case remounts update the graph only.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;

use crate::{error::SyncError, paths::to_slash};

pub trait BuildTool: Send + Sync {
    fn name(&self) -> &str;

    fn add_files(&self, files: Vec<PathBuf>) -> BoxFuture<'_, Result<(), SyncError>>;

    fn del_files(&self, files: Vec<PathBuf>) -> BoxFuture<'_, Result<(), SyncError>>;
}

/// Shared, swappable registration of the project's build tool.
#[derive(Clone, Default)]
pub struct BuildToolSlot(Arc<RwLock<Option<Arc<dyn BuildTool>>>>);

impl BuildToolSlot {
    pub fn register(&self, tool: Arc<dyn BuildTool>) {
        tracing::info!("Registered build tool '{}'", tool.name());
        *self.0.write() = Some(tool);
    }

    pub fn unregister(&self) -> Option<Arc<dyn BuildTool>> {
        self.0.write().take()
    }

    pub fn get(&self) -> Option<Arc<dyn BuildTool>> {
        self.0.read().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.0.read().is_some()
    }
}

/// Keeps a sorted, newline-separated list of project files on disk.
pub struct FileListBuildTool {
    path: PathBuf,
    files: Mutex<BTreeSet<PathBuf>>,
}

impl FileListBuildTool {
    pub fn new(path: PathBuf) -> Self {
        FileListBuildTool {
            path,
            files: Mutex::new(BTreeSet::new()),
        }
    }

    /// Start from the list already on disk, if any.
    pub async fn load(path: PathBuf) -> Result<Self, SyncError> {
        let files = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(PathBuf::from)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(FileListBuildTool {
            path,
            files: Mutex::new(files),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn files(&self) -> BTreeSet<PathBuf> {
        self.files.lock().await.clone()
    }

    async fn persist(&self, files: &BTreeSet<PathBuf>) -> Result<(), SyncError> {
        let mut text = String::new();
        for file in files.iter() {
            text.push_str(&to_slash(file));
            text.push('\n');
        }
        let failed = |e: std::io::Error| {
            SyncError::BuildTool(format!("cannot write {}: {e}", self.path.display()))
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(failed)?;
        }
        tokio::fs::write(&self.path, text).await.map_err(failed)?;
        Ok(())
    }
}

impl BuildTool for FileListBuildTool {
    fn name(&self) -> &str {
        "filelist"
    }

    fn add_files(&self, files: Vec<PathBuf>) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(async move {
            let mut current = self.files.lock().await;
            current.extend(files);
            self.persist(&current).await
        })
    }

    fn del_files(&self, files: Vec<PathBuf>) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(async move {
            let mut current = self.files.lock().await;
            for file in files.iter() {
                current.remove(file);
            }
            self.persist(&current).await
        })
    }
}
