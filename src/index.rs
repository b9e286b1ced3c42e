//! Classification of absolute paths as managed, ignored or unmanaged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::fs::path::normalize;
use crate::fs::probe::FileSystem;

/// The class a path belongs to relative to the dotfile tool's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathClass {
    Managed,
    Ignored,
    Unmanaged,
}

/// Immutable classification snapshot built from the three source lists.
///
/// On overlap, ignored beats unmanaged beats managed.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedPathIndex {
    class_map: HashMap<PathBuf, PathClass>,
    /// Sorted; only entries of the unmanaged list that are directories on disk.
    unmanaged_dir_roots: Vec<PathBuf>,
    /// Sorted union of every key in `class_map`.
    all_paths: Vec<PathBuf>,
    ready: bool,
}

impl ClassifiedPathIndex {
    /// Build the index. `None` means that source has not been loaded yet.
    pub fn build(
        managed: Option<&[PathBuf]>,
        ignored: Option<&[PathBuf]>,
        unmanaged: Option<&[PathBuf]>,
        fs: &dyn FileSystem,
    ) -> Self {
        let mut class_map = HashMap::new();

        for path in managed.unwrap_or_default() {
            let path = normalize(path);
            if !path.as_os_str().is_empty() {
                class_map.insert(path, PathClass::Managed);
            }
        }
        for path in ignored.unwrap_or_default() {
            let path = normalize(path);
            if !path.as_os_str().is_empty() {
                class_map.insert(path, PathClass::Ignored);
            }
        }

        let mut unmanaged_dir_roots = Vec::new();
        for path in unmanaged.unwrap_or_default() {
            let path = normalize(path);
            if path.as_os_str().is_empty() {
                continue;
            }
            if matches!(fs.stat(&path), Ok(stat) if stat.is_dir) {
                unmanaged_dir_roots.push(path.clone());
            }
            if class_map.get(&path) != Some(&PathClass::Ignored) {
                class_map.insert(path, PathClass::Unmanaged);
            }
        }
        unmanaged_dir_roots.sort();
        unmanaged_dir_roots.dedup();

        let mut all_paths: Vec<PathBuf> = class_map.keys().cloned().collect();
        all_paths.sort();

        Self {
            class_map,
            unmanaged_dir_roots,
            all_paths,
            ready: managed.is_some() && (ignored.is_some() || unmanaged.is_some()),
        }
    }

    /// Whether classification results can be trusted.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Class of `path`, defaulting to managed for anything unknown.
    pub fn classify(&self, path: &Path) -> PathClass {
        self.lookup(path).unwrap_or(PathClass::Managed)
    }

    /// Class of `path` if the index knows it, either directly or as a
    /// descendant of an unmanaged directory root.
    pub fn lookup(&self, path: &Path) -> Option<PathClass> {
        if path.as_os_str().is_empty() {
            return None;
        }
        let path = normalize(path);
        if let Some(class) = self.class_map.get(&path) {
            return Some(*class);
        }
        if self.under_unmanaged_root(&path) {
            return Some(PathClass::Unmanaged);
        }
        None
    }

    fn under_unmanaged_root(&self, path: &Path) -> bool {
        // Nearest root <= path. Component ordering keeps a root's
        // descendants contiguous right after it.
        let idx = self.unmanaged_dir_roots.partition_point(|r| r.as_path() <= path);
        if idx > 0 && path.starts_with(&self.unmanaged_dir_roots[idx - 1]) {
            return true;
        }
        // A nested root may sit between an outer root and `path`.
        path.ancestors()
            .skip(1)
            .any(|ancestor| self.is_unmanaged_dir_root(ancestor))
    }

    /// Exact-match membership in the unmanaged directory roots.
    pub fn is_unmanaged_dir_root(&self, path: &Path) -> bool {
        self.unmanaged_dir_roots
            .binary_search_by(|r| r.as_path().cmp(path))
            .is_ok()
    }

    /// Sorted paths whose class equals `class`.
    pub fn projected_paths(&self, class: PathClass) -> Vec<PathBuf> {
        self.all_paths
            .iter()
            .filter(|p| self.class_map.get(*p) == Some(&class))
            .cloned()
            .collect()
    }

    pub fn all_paths(&self) -> &[PathBuf] {
        &self.all_paths
    }

    pub fn unmanaged_dir_roots(&self) -> &[PathBuf] {
        &self.unmanaged_dir_roots
    }

    pub fn len(&self) -> usize {
        self.class_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.class_map.is_empty()
    }
}
