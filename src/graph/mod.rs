//! ProjectGraph: the in-memory structural model of an HDL project.
//!
//! The graph owns every [`TrackedFile`] and the [`HdlModule`]s parsed out of it, plus two
//! derived indices:
//!
//! - a project-wide name index (module name → defining files) used to resolve instances
//!   across files;
//! - a pending queue (module name → instances waiting for it) holding exactly the
//!   instances that are currently unresolved. It is drained when a module of that name
//!   is created, and refilled when a resolved target disappears.
//!
//! [`ProjectGraph::reconcile`] is the incremental update: it diffs a fresh parse result
//! against the module set recorded for a file and patches in place, so module ids and
//! existing instance resolutions survive a re-parse.
//!
//! ```rust
//! use hdl_sync::graph::ProjectGraph;
//! use hdl_sync::parser::{FastParse, LanguageId, MacroTable, RawModule};
//! use std::path::Path;
//!
//! let mut graph = ProjectGraph::default();
//! let path = Path::new("/prj/user/src/top.v");
//! graph.create_file(path, LanguageId::Verilog);
//! let parsed = FastParse {
//!     content: vec![RawModule::new("top").with_instance("u0", "core")],
//!     macros: MacroTable::new(),
//!     language: LanguageId::Verilog,
//! };
//! let report = graph.reconcile(path, &parsed);
//! assert_eq!(report.created, vec!["top".to_string()]);
//! assert_eq!(graph.unhandled_instances().len(), 1);
//! ```

use petgraph::{graphmap::DiGraphMap, Direction};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use crate::parser::{FastParse, LanguageId, RawInstance, RawModule};

mod file;
mod module;


pub use file::TrackedFile;
pub use module::{HdlModule, Instance, ModuleId, ModuleKey};

type NameIndex = BTreeMap<String, BTreeSet<PathBuf>>;
type PendingQueue = BTreeMap<String, BTreeSet<(ModuleKey, String)>>;

/// Module names touched by one [`ProjectGraph::reconcile`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    /// Existing modules whose ports, parameters, range or instances changed
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    pub deleted: Vec<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub files: usize,
    pub modules: usize,
    pub instances: usize,
    pub unhandled: usize,
    /// Total instance resolutions performed since the graph was created
    pub resolutions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnhandledInstance {
    pub parent: ModuleKey,
    pub instance: String,
    pub type_name: String,
}

#[derive(Debug, Default, Clone)]
pub struct ProjectGraph {
    files: BTreeMap<PathBuf, TrackedFile>,
    index: NameIndex,
    pending: PendingQueue,
    next_id: u64,
    resolutions: u64,
}

impl ProjectGraph {
    /// Register an empty file. Returns false if the path was already tracked, in which
    /// case nothing changes.
    pub fn create_file(&mut self, path: &Path, language: LanguageId) -> bool {
        if self.files.contains_key(path) {
            return false;
        }
        self.files.insert(
            path.to_path_buf(),
            TrackedFile::new(path.to_path_buf(), language),
        );
        true
    }

    pub fn get_file(&self, path: &Path) -> Option<&TrackedFile> {
        self.files.get(path)
    }

    pub fn contains_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Remove a file and all of its modules. Instances elsewhere that pointed at those
    /// modules are re-resolved against another definition, or become unhandled again.
    pub fn delete_file(&mut self, path: &Path) -> bool {
        let Some(file) = self.files.get(path) else {
            return false;
        };
        let names = file.modules.keys().cloned().collect::<Vec<_>>();
        for name in names {
            self.delete_module(path, &name);
        }
        self.files.remove(path);
        true
    }

    pub fn set_diagnostics(&mut self, path: &Path, diagnostics: Vec<String>) -> bool {
        match self.files.get_mut(path) {
            Some(file) => {
                file.diagnostics = diagnostics;
                true
            }
            None => false,
        }
    }

    /// Diff `parsed` against the modules recorded for `path` and patch the graph.
    ///
    /// Modules are matched by exact name. Matching modules are updated in place and keep
    /// their [`ModuleId`]; unmatched raw modules are created; recorded modules absent
    /// from `parsed` are deleted. The macro table is replaced wholesale. An untracked
    /// path is left alone and yields an empty report.
    pub fn reconcile(&mut self, path: &Path, parsed: &FastParse) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let Some(file) = self.files.get_mut(path) else {
            tracing::debug!("[ProjectGraph] reconcile: {:?} is not tracked", path);
            return report;
        };
        file.macros = parsed.macros.clone();
        file.language = parsed.language;

        let mut unchecked = file.modules.keys().cloned().collect::<BTreeSet<_>>();
        let mut seen = BTreeSet::new();
        for raw in parsed.content.iter() {
            if !seen.insert(raw.name.as_str()) {
                tracing::warn!(
                    "[ProjectGraph] {:?} defines module `{}` more than once, keeping the first",
                    path,
                    raw.name
                );
                continue;
            }
            if unchecked.remove(&raw.name) {
                if self.update_module(path, raw) {
                    report.updated.push(raw.name.clone());
                } else {
                    report.unchanged.push(raw.name.clone());
                }
            } else {
                self.create_module(path, raw);
                report.created.push(raw.name.clone());
            }
        }
        for name in unchecked {
            self.delete_module(path, &name);
            report.deleted.push(name);
        }
        tracing::trace!("[ProjectGraph] reconciled {:?}: {:?}", path, report);
        report
    }

    fn create_module(&mut self, path: &Path, raw: &RawModule) {
        let key = ModuleKey::new(path, &raw.name);
        let id = ModuleId(self.next_id);
        self.next_id += 1;

        let mut module = HdlModule {
            id,
            name: raw.name.clone(),
            path: path.to_path_buf(),
            ports: raw.ports.clone(),
            params: raw.params.clone(),
            instances: BTreeMap::new(),
            unhandled: BTreeSet::new(),
            range: raw.range,
        };
        for inst in unique_instances(raw) {
            let resolved = resolve(&self.index, &inst.type_name);
            match resolved {
                Some(_) => self.resolutions += 1,
                None => {
                    enqueue(&mut self.pending, &inst.type_name, &key, &inst.name);
                    module.unhandled.insert(inst.name.clone());
                }
            }
            module
                .instances
                .insert(inst.name.clone(), instance_from(inst, resolved));
        }

        self.index
            .entry(raw.name.clone())
            .or_default()
            .insert(path.to_path_buf());
        if let Some(file) = self.files.get_mut(path) {
            file.modules.insert(raw.name.clone(), module);
        }
        if resolve(&self.index, &raw.name).as_ref() == Some(&key) {
            self.rebind(&key);
        }
        self.drain_pending(&key);
    }

    /// Point every instance bound to another definition of `key.name` at `key`.
    fn rebind(&mut self, key: &ModuleKey) {
        let ProjectGraph {
            files, resolutions, ..
        } = self;
        for instance in files
            .values_mut()
            .flat_map(|file| file.modules.values_mut())
            .flat_map(|module| module.instances.values_mut())
        {
            let Some(current) = instance.resolved.as_ref() else {
                continue;
            };
            if current.name == key.name && current != key {
                instance.resolved = Some(key.clone());
                *resolutions += 1;
            }
        }
    }

    /// Resolve everything waiting for `key.name` to `key`.
    fn drain_pending(&mut self, key: &ModuleKey) {
        let Some(waiting) = self.pending.remove(&key.name) else {
            return;
        };
        for (parent, inst_name) in waiting {
            let Some(module) = module_mut(&mut self.files, &parent) else {
                continue;
            };
            if let Some(instance) = module.instances.get_mut(&inst_name) {
                instance.resolved = Some(key.clone());
                module.unhandled.remove(&inst_name);
                self.resolutions += 1;
            }
        }
    }

    /// Structural merge of `raw` into the existing module of the same name. Returns true
    /// if anything changed.
    fn update_module(&mut self, path: &Path, raw: &RawModule) -> bool {
        let key = ModuleKey::new(path, &raw.name);
        let ProjectGraph {
            files,
            index,
            pending,
            resolutions,
            ..
        } = self;
        let Some(module) = files
            .get_mut(path)
            .and_then(|file| file.modules.get_mut(&raw.name))
        else {
            return false;
        };

        let mut changed = false;
        if module.ports != raw.ports {
            module.ports = raw.ports.clone();
            changed = true;
        }
        if module.params != raw.params {
            module.params = raw.params.clone();
            changed = true;
        }
        if module.range != raw.range {
            module.range = raw.range;
            changed = true;
        }

        let incoming = unique_instances(raw);
        let keep = incoming
            .iter()
            .map(|inst| inst.name.as_str())
            .collect::<BTreeSet<_>>();
        let stale = module
            .instances
            .keys()
            .filter(|name| !keep.contains(name.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        for name in stale {
            if let Some(old) = module.instances.remove(&name) {
                if module.unhandled.remove(&name) {
                    unqueue(pending, &old.type_name, &key, &name);
                }
            }
            changed = true;
        }

        for inst in incoming {
            if let Some(existing) = module.instances.get_mut(&inst.name) {
                if existing.type_name == inst.type_name {
                    if existing.range != inst.range {
                        existing.range = inst.range;
                        changed = true;
                    }
                    continue;
                }
                // retargeted: drop the old link before resolving the new type
                if module.unhandled.remove(&inst.name) {
                    unqueue(pending, &existing.type_name, &key, &inst.name);
                }
            }
            let resolved = resolve(index, &inst.type_name);
            match resolved {
                Some(_) => *resolutions += 1,
                None => {
                    enqueue(pending, &inst.type_name, &key, &inst.name);
                    module.unhandled.insert(inst.name.clone());
                }
            }
            module
                .instances
                .insert(inst.name.clone(), instance_from(inst, resolved));
            changed = true;
        }
        changed
    }

    fn delete_module(&mut self, path: &Path, name: &str) {
        let key = ModuleKey::new(path, name);
        let Some(module) = self
            .files
            .get_mut(path)
            .and_then(|file| file.modules.remove(name))
        else {
            return;
        };
        if let Some(paths) = self.index.get_mut(name) {
            paths.remove(path);
            if paths.is_empty() {
                self.index.remove(name);
            }
        }
        for inst_name in module.unhandled.iter() {
            if let Some(inst) = module.instances.get(inst_name) {
                unqueue(&mut self.pending, &inst.type_name, &key, inst_name);
            }
        }

        let replacement = resolve(&self.index, name);
        let ProjectGraph {
            files,
            pending,
            resolutions,
            ..
        } = self;
        for file in files.values_mut() {
            for parent in file.modules.values_mut() {
                let parent_key = parent.key();
                for instance in parent.instances.values_mut() {
                    if instance.resolved.as_ref() != Some(&key) {
                        continue;
                    }
                    match replacement.as_ref() {
                        Some(other) => {
                            instance.resolved = Some(other.clone());
                            *resolutions += 1;
                        }
                        None => {
                            instance.resolved = None;
                            parent.unhandled.insert(instance.name.clone());
                            enqueue(pending, name, &parent_key, &instance.name);
                        }
                    }
                }
            }
        }
    }

    pub fn files(&self) -> impl Iterator<Item = &TrackedFile> {
        self.files.values()
    }

    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }

    /// Tracked files equal to or below `dir`.
    pub fn files_under(&self, dir: &Path) -> Vec<PathBuf> {
        self.files
            .keys()
            .filter(|path| path.starts_with(dir))
            .cloned()
            .collect()
    }

    /// All modules, ordered by path then name.
    pub fn modules(&self) -> impl Iterator<Item = &HdlModule> {
        self.files.values().flat_map(|file| file.modules.values())
    }

    pub fn module(&self, key: &ModuleKey) -> Option<&HdlModule> {
        self.files.get(&key.path)?.modules.get(&key.name)
    }

    pub fn module_keys(&self) -> BTreeSet<ModuleKey> {
        self.modules().map(HdlModule::key).collect()
    }

    pub fn module_by_id(&self, id: ModuleId) -> Option<&HdlModule> {
        self.modules().find(|module| module.id == id)
    }

    /// Every definition of `name` across the project.
    pub fn find_modules(&self, name: &str) -> Vec<&HdlModule> {
        self.index
            .get(name)
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(|path| self.files.get(path)?.modules.get(name))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn unhandled_instances(&self) -> Vec<UnhandledInstance> {
        self.pending
            .iter()
            .flat_map(|(type_name, waiting)| {
                waiting.iter().map(move |(parent, instance)| UnhandledInstance {
                    parent: parent.clone(),
                    instance: instance.clone(),
                    type_name: type_name.clone(),
                })
            })
            .collect()
    }

    /// Modules holding at least one instance resolved to `key`.
    pub fn dependents(&self, key: &ModuleKey) -> Vec<ModuleKey> {
        self.modules()
            .filter(|module| {
                module
                    .instances
                    .values()
                    .any(|inst| inst.resolved.as_ref() == Some(key))
            })
            .map(HdlModule::key)
            .collect()
    }

    /// Instantiation graph: an edge parent → child for every resolved instance.
    pub fn hierarchy(&self) -> DiGraphMap<ModuleId, ()> {
        let mut graph = DiGraphMap::new();
        for module in self.modules() {
            graph.add_node(module.id);
        }
        for module in self.modules() {
            for inst in module.instances.values() {
                if let Some(child) = inst.resolved.as_ref().and_then(|key| self.module(key)) {
                    graph.add_edge(module.id, child.id, ());
                }
            }
        }
        graph
    }

    /// Modules no other module instantiates, ordered by path then name.
    pub fn top_modules(&self) -> Vec<ModuleKey> {
        let graph = self.hierarchy();
        self.modules()
            .filter(|module| {
                graph
                    .neighbors_directed(module.id, Direction::Incoming)
                    .all(|parent| parent == module.id)
            })
            .map(HdlModule::key)
            .collect()
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            files: self.files.len(),
            resolutions: self.resolutions,
            ..Default::default()
        };
        for module in self.modules() {
            stats.modules += 1;
            stats.instances += module.instances.len();
            stats.unhandled += module.unhandled.len();
        }
        stats
    }
}

fn resolve(index: &NameIndex, name: &str) -> Option<ModuleKey> {
    index
        .get(name)?
        .iter()
        .next()
        .map(|path| ModuleKey::new(path, name))
}

fn module_mut<'a>(
    files: &'a mut BTreeMap<PathBuf, TrackedFile>,
    key: &ModuleKey,
) -> Option<&'a mut HdlModule> {
    files.get_mut(&key.path)?.modules.get_mut(&key.name)
}

fn enqueue(pending: &mut PendingQueue, type_name: &str, parent: &ModuleKey, instance: &str) {
    pending
        .entry(type_name.to_string())
        .or_default()
        .insert((parent.clone(), instance.to_string()));
}

fn unqueue(pending: &mut PendingQueue, type_name: &str, parent: &ModuleKey, instance: &str) {
    if let Some(waiting) = pending.get_mut(type_name) {
        waiting.remove(&(parent.clone(), instance.to_string()));
        if waiting.is_empty() {
            pending.remove(type_name);
        }
    }
}

/// Instances of `raw` with duplicate names dropped, first occurrence wins.
fn unique_instances(raw: &RawModule) -> Vec<&RawInstance> {
    let mut seen = BTreeSet::new();
    raw.instances
        .iter()
        .filter(|inst| seen.insert(inst.name.as_str()))
        .collect()
}

fn instance_from(raw: &RawInstance, resolved: Option<ModuleKey>) -> Instance {
    Instance {
        name: raw.name.clone(),
        type_name: raw.type_name.clone(),
        range: raw.range,
        resolved,
    }
}
