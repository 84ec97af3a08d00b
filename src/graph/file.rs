use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf};

use super::module::HdlModule;
use crate::parser::{LanguageId, MacroTable};

/// One source file known to the project and everything parsed out of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFile {
    pub path: PathBuf,
    pub language: LanguageId,
    pub modules: BTreeMap<String, HdlModule>,
    pub macros: MacroTable,
    /// Error strings from the last full parse
    pub diagnostics: Vec<String>,
}

impl TrackedFile {
    pub fn new(path: PathBuf, language: LanguageId) -> Self {
        TrackedFile {
            path,
            language,
            modules: BTreeMap::new(),
            macros: MacroTable::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
