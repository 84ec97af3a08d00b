//! Path normalization and HDL file discovery.
//!
//! Every path that enters the [`ProjectGraph`](crate::graph::ProjectGraph) goes through
//! [`normalize_path`] first, so watcher events, config roots and directory scans agree
//! on a single spelling for each file.

use std::{
    borrow::Cow,
    collections::BTreeSet,
    path::{Component, Path, PathBuf},
};
use walkdir::WalkDir;

use crate::parser::LanguageId;

/// Utility function to replace separators and convert to unicode (via to_string_lossy) on os path.
pub fn to_slash<P: AsRef<Path>>(os_path_ref: P) -> String {
    let path = os_path_ref.as_ref();
    let joined = path
        .components()
        .filter_map(|c| match c {
            Component::RootDir => None,
            _ => Some(c.as_os_str().to_string_lossy()),
        })
        .collect::<Vec<Cow<'_, str>>>()
        .join("/");
    if path.has_root() && !joined.contains(':') {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Resolve `.` and `..` without touching the file system.
pub fn lexical_normalize<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            _ => normalized.push(component),
        }
    }
    normalized
}

/// Produce the canonical key for a path.
///
/// Existing paths are canonicalized. Deleted files (unlink events) no longer exist, so
/// their parent is canonicalized instead and the file name re-attached; anything else
/// falls back to lexical normalization.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = lexical_normalize(path);
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if let Ok(parent) = parent.canonicalize() {
            return parent.join(name);
        }
    }
    path
}

/// Resolve `path` against `root` when relative, then normalize.
pub fn resolve_against<P: AsRef<Path>>(root: &Path, path: P) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(root.join(path))
    }
}

pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// True for paths with a recognized HDL extension whose file name is not hidden.
pub fn is_hdl_file(path: &Path) -> bool {
    !is_hidden(path) && LanguageId::from_path(path).is_some()
}

/// True if `path` equals or lies below any of `roots`.
pub fn is_under<'a, I>(path: &Path, roots: I) -> bool
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    roots.into_iter().any(|root| path.starts_with(root))
}

/// Walk `roots` and collect every HDL file below them. Missing roots are skipped and
/// hidden directories (`.git`, editor state) are not descended into.
pub fn collect_hdl_files<'a, I>(roots: I) -> BTreeSet<PathBuf>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let mut files = BTreeSet::new();
    for root in roots {
        if !root.exists() {
            tracing::debug!("collect_hdl_files: skipping missing root {:?}", root);
            continue;
        }
        let walker = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()));
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() && is_hdl_file(entry.path()) => {
                    files.insert(normalize_path(entry.path()));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("collect_hdl_files: {e}"),
            }
        }
    }
    files
}
