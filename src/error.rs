use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "service")]
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum SyncError {
    #[error("Build tool error: {0}")]
    BuildTool(String),
    #[error("Channel error: {0}")]
    Channel(String),
    #[error("Project configuration error: {0}")]
    Config(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Build tool integration is not registered")]
    MissingIntegration,
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Failed to parse {0}")]
    ParseFailure(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Path is not tracked by the project graph: {0}")]
    UntrackedPath(String),
    #[error("File watcher could not be set up: {0}")]
    WatcherSetup(String),
}

impl SyncError {
    /// Failures the handlers swallow without telling the user.
    pub fn is_silent(&self) -> bool {
        matches!(self, SyncError::UntrackedPath(_))
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(src: toml::de::Error) -> SyncError {
        SyncError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<io::Error> for SyncError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => SyncError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => SyncError::PermissionDenied,
            _ => SyncError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

#[cfg(feature = "service")]
impl From<NotifyError> for SyncError {
    fn from(notify_error: NotifyError) -> Self {
        match notify_error.kind {
            NotifyErrorKind::Generic(msg) => SyncError::WatcherSetup(format!(
                "notify-debouncer: {}, paths: {:?}",
                msg, notify_error.paths
            )),
            NotifyErrorKind::Io(io_error) => SyncError::WatcherSetup(format!(
                "notify-debouncer: io error {}, paths: {:?}",
                io_error.kind(),
                notify_error.paths
            )),
            NotifyErrorKind::PathNotFound => SyncError::NotFound(format!(
                "notify-debouncer: path(s) not found: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::WatchNotFound => SyncError::NotFound(format!(
                "notify-debouncer: watch not found, paths: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::InvalidConfig(_) => {
                SyncError::WatcherSetup("notify-debouncer invalid config".to_string())
            }
            NotifyErrorKind::MaxFilesWatch => SyncError::WatcherSetup(
                "notify-debouncer max file watch limit reached".to_string(),
            ),
        }
    }
}
