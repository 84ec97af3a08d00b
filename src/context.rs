use parking_lot::RwLock;
use std::{path::Path, sync::Arc};

use crate::{
    build_tool::{BuildTool, BuildToolSlot},
    config::ConfigStore,
    error::SyncError,
    event::Notifier,
    graph::ProjectGraph,
    parser::{ParseAdapter, ParserRegistry},
};

/// Everything the sync engines share for one open project.
///
/// Locks in here are synchronous; hold them for one critical section and never across
/// an `.await`.
#[derive(Clone)]
pub struct ProjectContext {
    pub graph: Arc<RwLock<ProjectGraph>>,
    pub config: Arc<RwLock<ConfigStore>>,
    pub parsers: ParseAdapter,
    pub notifier: Arc<Notifier>,
    pub build_tool: BuildToolSlot,
}

impl ProjectContext {
    pub fn new(config: ConfigStore, parsers: ParseAdapter) -> Self {
        ProjectContext {
            graph: Arc::new(RwLock::new(ProjectGraph::default())),
            config: Arc::new(RwLock::new(config)),
            parsers,
            notifier: Arc::new(Notifier::new()),
            build_tool: BuildToolSlot::default(),
        }
    }

    /// Open the project rooted at `workspace` with the built-in parsers.
    pub fn open(workspace: &Path, config_file: Option<&Path>) -> Result<Self, SyncError> {
        let config = ConfigStore::open(workspace, config_file)?;
        Ok(ProjectContext::new(
            config,
            ParseAdapter::new(ParserRegistry::create()),
        ))
    }

    pub fn with_build_tool(self, tool: Arc<dyn BuildTool>) -> Self {
        self.build_tool.register(tool);
        self
    }
}
