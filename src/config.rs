//! Project configuration: the user's property file merged onto defaults, and the path
//! sets derived from it.
//!
//! Nothing derived is ever stored. [`ConfigStore::tracked_paths`] and
//! [`ConfigStore::hardware_files`] are recomputed from the live [`ProjectConfig`] each
//! time they are asked for, which is what lets a config change be detected by comparing
//! two snapshots.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs::read_to_string,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{error::SyncError, paths};

pub const DEFAULT_CONFIG_FILE: &str = "property.json";
pub const DEFAULT_SRC_PATH: &str = "user/src";
pub const DEFAULT_SIM_PATH: &str = "user/sim";

/// Set of root directories whose HDL files belong to the project.
pub type TrackedPathSet = BTreeSet<PathBuf>;

/// The property file as written by the user. Every field is optional.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawProjectConfig {
    pub arch: Option<RawArch>,
    pub library: Option<RawLibrary>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawArch {
    pub hardware: Option<RawHardware>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawHardware {
    pub src: Option<PathBuf>,
    pub sim: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLibrary {
    #[serde(alias = "commonPath")]
    pub common_path: Option<PathBuf>,
    #[serde(alias = "customPath")]
    pub custom_path: Option<PathBuf>,
}

/// Effective project configuration. Paths may still be relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub src: PathBuf,
    pub sim: PathBuf,
    pub lib_common: Option<PathBuf>,
    pub lib_custom: Option<PathBuf>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        ProjectConfig {
            src: PathBuf::from(DEFAULT_SRC_PATH),
            sim: PathBuf::from(DEFAULT_SIM_PATH),
            lib_common: None,
            lib_custom: None,
        }
    }
}

impl ProjectConfig {
    /// Apply `raw` on top of the defaults.
    pub fn from_raw(raw: &RawProjectConfig) -> Self {
        let mut config = ProjectConfig::default();
        if let Some(hardware) = raw.arch.as_ref().and_then(|arch| arch.hardware.as_ref()) {
            if let Some(src) = hardware.src.as_ref() {
                config.src = src.clone();
            }
            if let Some(sim) = hardware.sim.as_ref() {
                config.sim = sim.clone();
            }
        }
        if let Some(library) = raw.library.as_ref() {
            config.lib_common = library.common_path.clone();
            config.lib_custom = library.custom_path.clone();
        }
        config
    }
}

/// Where the raw project configuration comes from.
pub trait ConfigSource: Send + Sync {
    /// Read the current raw configuration. A missing source is not an error; it yields
    /// the empty configuration.
    fn raw_project_info(&self) -> Result<RawProjectConfig, SyncError>;

    /// File backing this source, if any. The config watcher watches this path.
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// Property file on disk. `.toml` files are read as TOML, everything else as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: PathBuf) -> Self {
        FileConfigSource { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn raw_project_info(&self) -> Result<RawProjectConfig, SyncError> {
        tracing::debug!("Reading project config from {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Project config not found, using defaults.");
            return Ok(RawProjectConfig::default());
        }
        let content = read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(RawProjectConfig::default());
        }
        let is_toml = self
            .path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        let raw = if is_toml {
            toml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };
        raw.map_err(|e| SyncError::Config(format!("{}: {e}", self.path.display())))
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Fixed configuration, for tests and embedders that manage config themselves.
#[derive(Debug, Default, Clone)]
pub struct StaticConfigSource(pub RawProjectConfig);

impl ConfigSource for StaticConfigSource {
    fn raw_project_info(&self) -> Result<RawProjectConfig, SyncError> {
        Ok(self.0.clone())
    }
}

/// Live configuration of one project.
#[derive(Clone)]
pub struct ConfigStore {
    workspace: PathBuf,
    source: Arc<dyn ConfigSource>,
    config: ProjectConfig,
}

impl ConfigStore {
    /// A store holding the default configuration. Call [`ConfigStore::reload`] to read
    /// the source.
    pub fn new(workspace: &Path, source: Arc<dyn ConfigSource>) -> Self {
        ConfigStore {
            workspace: paths::normalize_path(workspace),
            source,
            config: ProjectConfig::default(),
        }
    }

    /// Open `workspace`, reading its property file if present.
    pub fn open(workspace: &Path, config_file: Option<&Path>) -> Result<Self, SyncError> {
        let file = match config_file {
            Some(file) => paths::resolve_against(workspace, file),
            None => paths::resolve_against(workspace, DEFAULT_CONFIG_FILE),
        };
        let mut store = ConfigStore::new(workspace, Arc::new(FileConfigSource::new(file)));
        store.reload()?;
        Ok(store)
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn source(&self) -> Arc<dyn ConfigSource> {
        self.source.clone()
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Config file path, normalized, if the source is file backed.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.source.location().map(paths::normalize_path)
    }

    /// Replace the live configuration with `raw` merged onto the defaults.
    pub fn merge(&mut self, raw: &RawProjectConfig) {
        self.config = ProjectConfig::from_raw(raw);
    }

    /// Read the source and merge it. On failure the live configuration is unchanged.
    pub fn reload(&mut self) -> Result<(), SyncError> {
        let raw = self.source.raw_project_info()?;
        self.merge(&raw);
        Ok(())
    }

    /// Absolute roots of every configured path. Unset library paths are left out.
    pub fn tracked_paths(&self) -> TrackedPathSet {
        let config = &self.config;
        [
            Some(&config.sim),
            Some(&config.src),
            config.lib_common.as_ref(),
            config.lib_custom.as_ref(),
        ]
        .into_iter()
        .flatten()
        .map(|path| paths::resolve_against(&self.workspace, path))
        .collect()
    }

    /// Every HDL file under the tracked paths.
    pub fn hardware_files(&self) -> BTreeSet<PathBuf> {
        paths::collect_hdl_files(&self.tracked_paths())
    }

    /// True if `path` lies under one of the tracked roots.
    pub fn is_tracked(&self, path: &Path) -> bool {
        paths::is_under(path, &self.tracked_paths())
    }
}

/// Settings of the watch service itself, as opposed to the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Debounce window for file system events, in milliseconds
    pub debounce_ms: u64,
    /// Project property file, relative to the workspace root
    pub config_file: PathBuf,
    /// Where [`FileListBuildTool`](crate::build_tool::FileListBuildTool) keeps its list
    pub filelist: Option<PathBuf>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        MonitorSettings {
            debounce_ms: 200,
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            filelist: None,
        }
    }
}

impl MonitorSettings {
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let content = read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
