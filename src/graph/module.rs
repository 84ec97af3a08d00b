use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::{Path, PathBuf},
};

use crate::parser::{RawParam, RawPort, SourceRange};

/// Stable identity of a module. Survives in-place updates; a module that is deleted and
/// re-created under the same name gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Addresses a module by its defining file and name. Orders by path, then name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleKey {
    pub path: PathBuf,
    pub name: String,
}

impl ModuleKey {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        ModuleKey {
            path: path.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", crate::paths::to_slash(&self.path), self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    /// Name of the instantiated module
    pub type_name: String,
    pub range: SourceRange,
    /// Filled once a module named `type_name` is known somewhere in the project.
    pub resolved: Option<ModuleKey>,
}

impl Instance {
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HdlModule {
    pub id: ModuleId,
    pub name: String,
    /// Defining file
    pub path: PathBuf,
    pub ports: Vec<RawPort>,
    pub params: Vec<RawParam>,
    pub instances: BTreeMap<String, Instance>,
    /// Names of instances whose type is not (yet) defined anywhere
    pub unhandled: BTreeSet<String>,
    pub range: SourceRange,
}

impl HdlModule {
    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(&self.path, &self.name)
    }

    pub fn is_defined_in(&self, path: &Path) -> bool {
        self.path == path
    }
}
