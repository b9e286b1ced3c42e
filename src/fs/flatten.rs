//! Turning a [`Tree`] into the ordered rows a renderer draws.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::fs::probe::FileSystem;
use crate::fs::tree::{build_tree, NodeId, Tree};

/// One visible line of the tree view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRow {
    pub node: NodeId,
    pub depth: usize,
    /// Last visible sibling at its depth.
    pub is_last: bool,
    /// `is_last` of every ancestor, outermost first.
    pub ancestors_last: Vec<bool>,
    /// Descendant files (matching ones only, when filtered). Zero for files.
    pub file_count: usize,
}

/// Per-node file counts, accumulated bottom-up over the arena.
fn file_counts(tree: &Tree, hits: impl Fn(NodeId) -> bool) -> Vec<usize> {
    let mut counts = vec![0usize; tree.len() + 1];
    for id in tree.ids().rev() {
        let node = tree.node(id);
        if !node.is_dir && hits(id) {
            counts[id] += 1;
        }
        if let Some(parent) = node.parent {
            counts[parent] += counts[id];
        }
    }
    counts
}

/// Rows for the current expand/collapse state, depth-first pre-order.
pub fn flatten(tree: &Tree) -> Vec<FlatRow> {
    let counts = file_counts(tree, |_| true);
    let mut rows = Vec::new();
    let mut stack = Vec::new();
    emit(tree, tree.top_level(), &counts, &|_| true, &mut stack, &mut rows);
    rows
}

/// Rows restricted to nodes whose absolute path is in `matches`, plus the
/// directories leading to them. Unmatched branches are pruned.
pub fn filter(tree: &Tree, matches: &HashSet<PathBuf>) -> Vec<FlatRow> {
    let is_match = |id: NodeId| {
        let node = tree.node(id);
        !node.abs_path.as_os_str().is_empty() && matches.contains(&node.abs_path)
    };

    let mut keep = vec![false; tree.len() + 1];
    for id in tree.ids().rev() {
        if is_match(id) {
            keep[id] = true;
        }
        if keep[id] {
            if let Some(parent) = tree.node(id).parent {
                keep[parent] = true;
            }
        }
    }

    let counts = file_counts(tree, is_match);
    let top: Vec<NodeId> = tree
        .top_level()
        .iter()
        .copied()
        .filter(|id| keep[*id])
        .collect();
    let mut rows = Vec::new();
    let mut stack = Vec::new();
    emit(tree, &top, &counts, &|id| keep[id], &mut stack, &mut rows);
    rows
}

fn emit(
    tree: &Tree,
    siblings: &[NodeId],
    counts: &[usize],
    visible: &dyn Fn(NodeId) -> bool,
    ancestors_last: &mut Vec<bool>,
    rows: &mut Vec<FlatRow>,
) {
    for (i, &id) in siblings.iter().enumerate() {
        let node = tree.node(id);
        let is_last = i == siblings.len() - 1;
        rows.push(FlatRow {
            node: id,
            depth: ancestors_last.len(),
            is_last,
            ancestors_last: ancestors_last.clone(),
            file_count: if node.is_dir { counts[id] } else { 0 },
        });

        if node.is_dir && node.expanded {
            let children: Vec<NodeId> = node
                .children
                .iter()
                .copied()
                .filter(|c| visible(*c))
                .collect();
            if !children.is_empty() {
                ancestors_last.push(is_last);
                emit(tree, &children, counts, visible, ancestors_last, rows);
                ancestors_last.pop();
            }
        }
    }
}

/// A synthetic tree built from matched paths, with its rows.
#[derive(Debug, Clone)]
pub struct Projection {
    pub tree: Tree,
    pub rows: Vec<FlatRow>,
}

/// Ancestor-inclusive view of `abs_paths`, fully expanded, independent of
/// any live tree.
pub fn project(abs_paths: &[PathBuf], base_dir: &Path, fs: &dyn FileSystem) -> Projection {
    let mut tree = build_tree(abs_paths, base_dir, fs);
    tree.expand_all();
    let rows = flatten(&tree);
    Projection { tree, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::probe::fake::FakeFs;

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    fn row_names(tree: &Tree, rows: &[FlatRow]) -> Vec<String> {
        rows.iter().map(|r| tree.node(r.node).rel_path.clone()).collect()
    }

    fn sample_tree() -> Tree {
        let mut tree = build_tree(
            &paths(&[
                "/h/.config/nvim/init.lua",
                "/h/.config/nvim/lua/plugins.lua",
                "/h/.config/git/config",
                "/h/.bashrc",
            ]),
            Path::new("/h"),
            &FakeFs::new(),
        );
        tree.expand_all();
        tree
    }

    #[test]
    fn flatten_is_preorder_and_respects_collapse() {
        let mut tree = sample_tree();
        let rows = flatten(&tree);
        assert_eq!(
            row_names(&tree, &rows),
            vec![
                ".config",
                ".config/git",
                ".config/git/config",
                ".config/nvim",
                ".config/nvim/lua",
                ".config/nvim/lua/plugins.lua",
                ".config/nvim/init.lua",
                ".bashrc",
            ]
        );

        let nvim = tree.find(".config/nvim").unwrap();
        tree.node_mut(nvim).expanded = false;
        let rows = flatten(&tree);
        assert_eq!(rows.len(), 5);
        assert!(!row_names(&tree, &rows).contains(&".config/nvim/init.lua".to_string()));
    }

    #[test]
    fn flatten_tracks_connector_bits() {
        let tree = sample_tree();
        let rows = flatten(&tree);

        // .config is not the last top-level entry; .bashrc is.
        assert!(!rows[0].is_last);
        assert!(rows[7].is_last);
        // plugins.lua: under .config (not last) -> nvim (last) -> lua (not last).
        let plugins = &rows[5];
        assert_eq!(plugins.depth, 3);
        assert_eq!(plugins.ancestors_last, vec![false, true, false]);
        assert!(plugins.is_last);
    }

    #[test]
    fn flatten_counts_descendant_files() {
        let tree = sample_tree();
        let rows = flatten(&tree);
        assert_eq!(rows[0].file_count, 3); // .config
        assert_eq!(rows[3].file_count, 2); // nvim
        assert_eq!(rows[7].file_count, 0); // .bashrc
    }

    #[test]
    fn filter_prunes_unmatched_branches() {
        let tree = sample_tree();
        let matches: HashSet<PathBuf> = paths(&["/h/.config/nvim/init.lua"]).into_iter().collect();
        let rows = filter(&tree, &matches);
        assert_eq!(
            row_names(&tree, &rows),
            vec![".config", ".config/nvim", ".config/nvim/init.lua"]
        );
        assert!(rows.iter().all(|r| r.is_last));
        assert_eq!(rows[0].file_count, 1);
    }

    #[test]
    fn filter_with_no_matches_is_empty() {
        let tree = sample_tree();
        let rows = filter(&tree, &HashSet::new());
        assert!(rows.is_empty());
    }

    #[test]
    fn filter_keeps_matching_directory_leaves() {
        let fs = FakeFs::new().dir("/h/proj");
        let mut tree = build_tree(&paths(&["/h/proj", "/h/other"]), Path::new("/h"), &fs);
        tree.expand_all();
        let matches: HashSet<PathBuf> = paths(&["/h/proj"]).into_iter().collect();
        let rows = filter(&tree, &matches);
        assert_eq!(row_names(&tree, &rows), vec!["proj"]);
        assert_eq!(rows[0].file_count, 0);
    }

    #[test]
    fn filter_respects_user_collapse() {
        let mut tree = sample_tree();
        let matches: HashSet<PathBuf> =
            paths(&["/h/.config/nvim/init.lua", "/h/.bashrc"]).into_iter().collect();
        tree.node_mut(tree.find(".config").unwrap()).expanded = false;
        let rows = filter(&tree, &matches);
        assert_eq!(row_names(&tree, &rows), vec![".config", ".bashrc"]);
        assert_eq!(rows[0].file_count, 1);
    }

    #[test]
    fn project_includes_every_ancestor() {
        let projection = project(
            &paths(&["/h/a/b/c/deep.txt"]),
            Path::new("/h"),
            &FakeFs::new(),
        );
        assert_eq!(
            row_names(&projection.tree, &projection.rows),
            vec!["a", "a/b", "a/b/c", "a/b/c/deep.txt"]
        );
    }

    #[test]
    fn project_excludes_unrelated_siblings() {
        let fs = FakeFs::new()
            .dir("/h/a")
            .dir("/h/a/x")
            .dir("/h/a/y")
            .listing("/h/a", &[("x", true), ("y", true), ("notes.md", false)])
            .listing("/h/a/x", &[("match.txt", false), ("other.txt", false)]);
        let projection = project(&paths(&["/h/a/x/match.txt"]), Path::new("/h"), &fs);
        let names = row_names(&projection.tree, &projection.rows);
        assert_eq!(names, vec!["a", "a/x", "a/x/match.txt"]);
        assert!(projection.tree.find("a/y").is_none());
        assert!(projection.tree.find("a/notes.md").is_none());
        assert!(projection.tree.find("a/x/other.txt").is_none());
    }

    #[test]
    fn project_expands_multi_child_directories() {
        let projection = project(
            &paths(&["/h/a/x/match.txt", "/h/a/y/also.txt"]),
            Path::new("/h"),
            &FakeFs::new(),
        );
        // Multi-child directories are still expanded.
        assert_eq!(
            row_names(&projection.tree, &projection.rows),
            vec!["a", "a/x", "a/x/match.txt", "a/y", "a/y/also.txt"]
        );
    }
}
