use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::fs::path::{is_strict_descendant, normalize, relative_slash};
use crate::fs::probe::{DirEntryInfo, FileSystem};

/// Index of a node in its owning [`Tree`] arena.
pub type NodeId = usize;

/// A file or directory in the navigable hierarchy.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    /// Slash-separated path relative to the tree's base directory.
    pub rel_path: String,
    /// Empty for directories synthesized as ancestors of listed paths.
    pub abs_path: PathBuf,
    pub is_dir: bool,
    pub expanded: bool,
    pub depth: usize,
    /// Directory whose children have not been read from disk yet.
    pub opaque: bool,
    pub loading: bool,
    pub loading_request: u64,
    /// Back-reference for navigation only; the arena owns every node.
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl TreeNode {
    fn new(name: String, rel_path: String, is_dir: bool, depth: usize) -> Self {
        Self {
            name,
            rel_path,
            abs_path: PathBuf::new(),
            is_dir,
            expanded: false,
            depth,
            opaque: false,
            loading: false,
            loading_request: 0,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Arena-backed hierarchy rooted at a base directory.
///
/// Node 0 is the base directory itself and is never rendered; its children
/// sit at depth 0. A parent is always allocated before its children.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<TreeNode>,
    by_rel: HashMap<String, NodeId>,
    base_dir: PathBuf,
    pub dir_count: usize,
    pub file_count: usize,
}

impl Tree {
    pub const ROOT: NodeId = 0;

    /// An empty tree containing only the base node.
    pub fn empty(base_dir: &Path) -> Self {
        let base_dir = normalize(base_dir);
        let mut root = TreeNode::new(String::new(), String::new(), true, 0);
        root.abs_path = base_dir.clone();
        root.expanded = true;
        Self {
            nodes: vec![root],
            by_rel: HashMap::new(),
            base_dir,
            dir_count: 0,
            file_count: 0,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        &mut self.nodes[id]
    }

    /// Number of nodes, excluding the base node.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn top_level(&self) -> &[NodeId] {
        &self.nodes[Self::ROOT].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent.filter(|p| *p != Self::ROOT)
    }

    pub fn find(&self, rel_path: &str) -> Option<NodeId> {
        self.by_rel.get(rel_path).copied()
    }

    /// Absolute path of a node, reconstructing it for synthesized directories.
    pub fn resolve_abs(&self, id: NodeId) -> PathBuf {
        let node = &self.nodes[id];
        if !node.abs_path.as_os_str().is_empty() {
            return node.abs_path.clone();
        }
        if node.rel_path.starts_with('/') {
            PathBuf::from(&node.rel_path)
        } else {
            self.base_dir.join(&node.rel_path)
        }
    }

    /// Ids in arena order; parents precede children.
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = NodeId> {
        1..self.nodes.len()
    }

    fn alloc(&mut self, mut node: TreeNode, parent: NodeId) -> NodeId {
        let id = self.nodes.len();
        node.parent = Some(parent);
        self.by_rel.insert(node.rel_path.clone(), id);
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        id
    }

    fn sort_children_of(&mut self, id: NodeId) {
        let mut children = std::mem::take(&mut self.nodes[id].children);
        children.sort_by(|a, b| {
            let (a, b) = (&self.nodes[*a], &self.nodes[*b]);
            b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name))
        });
        self.nodes[id].children = children;
    }

    fn sort_all_children(&mut self) {
        for id in 0..self.nodes.len() {
            self.sort_children_of(id);
        }
    }

    /// Expand every directory that has exactly one child.
    pub fn auto_expand(&mut self) {
        for node in self.nodes.iter_mut().skip(1) {
            if node.is_dir && node.children.len() == 1 {
                node.expanded = true;
            }
        }
    }

    /// Expand every directory that has children loaded.
    pub fn expand_all(&mut self) {
        for node in self.nodes.iter_mut().skip(1) {
            if node.is_dir && !node.opaque {
                node.expanded = true;
            }
        }
    }

    /// Relative paths of every collapsed directory.
    pub fn collapsed_dirs(&self) -> HashSet<String> {
        self.nodes
            .iter()
            .skip(1)
            .filter(|n| n.is_dir && !n.expanded)
            .map(|n| n.rel_path.clone())
            .collect()
    }

    /// Collapse every directory whose relative path is in `collapsed`.
    pub fn apply_collapsed(&mut self, collapsed: &HashSet<String>) {
        for rel in collapsed {
            if let Some(id) = self.find(rel) {
                if self.nodes[id].is_dir {
                    self.nodes[id].expanded = false;
                }
            }
        }
    }

    /// Mark an opaque directory as being populated by request `request`.
    pub fn begin_loading(&mut self, id: NodeId, request: u64) {
        let node = &mut self.nodes[id];
        node.loading = true;
        node.loading_request = request;
    }

    pub fn clear_loading(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        node.loading = false;
        node.loading_request = 0;
    }

    /// Fill an opaque directory from a directory listing. Subdirectories are
    /// created opaque themselves.
    pub fn populate(&mut self, id: NodeId, entries: Vec<DirEntryInfo>) {
        let parent_abs = self.resolve_abs(id);
        let parent_rel = self.nodes[id].rel_path.clone();
        let depth = if id == Self::ROOT {
            0
        } else {
            self.nodes[id].depth + 1
        };

        for entry in entries {
            let rel = join_rel(&parent_rel, &entry.name);
            if self.by_rel.contains_key(&rel) {
                continue;
            }
            let mut child = TreeNode::new(entry.name.clone(), rel, entry.is_dir, depth);
            child.abs_path = parent_abs.join(&entry.name);
            child.opaque = entry.is_dir;
            if entry.is_dir {
                self.dir_count += 1;
            } else {
                self.file_count += 1;
            }
            self.alloc(child, id);
        }

        self.sort_children_of(id);
        let node = &mut self.nodes[id];
        node.opaque = false;
        node.expanded = true;
        node.loading = false;
        node.loading_request = 0;
    }
}

fn join_rel(parent: &str, name: &str) -> String {
    match parent {
        "" => name.to_string(),
        "/" => format!("/{name}"),
        _ => format!("{parent}/{name}"),
    }
}

/// Sort, drop duplicates, and drop any path already covered by an ancestor
/// in the same set.
pub fn dedup_subsumed(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.sort();
    paths.dedup();
    let mut kept: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for path in paths {
        // Component ordering places descendants right after their ancestor.
        if let Some(last) = kept.last() {
            if is_strict_descendant(&path, last) {
                continue;
            }
        }
        kept.push(path);
    }
    kept
}

/// Build a navigable tree from a flat list of absolute paths.
///
/// Leaves that turn out to be directories on disk become opaque directory
/// nodes; stat failures leave them as files.
pub fn build_tree(abs_paths: &[PathBuf], base_dir: &Path, fs: &dyn FileSystem) -> Tree {
    let mut tree = Tree::empty(base_dir);
    let base = tree.base_dir.clone();

    let cleaned: Vec<PathBuf> = abs_paths
        .iter()
        .map(|p| normalize(p))
        .filter(|p| !p.as_os_str().is_empty() && p.as_path() != Path::new(".") && *p != base)
        .collect();

    let mut leaves: Vec<NodeId> = Vec::new();
    for path in dedup_subsumed(cleaned) {
        let rel = relative_slash(&path, &base);
        let absolute = rel.starts_with('/');
        let segments: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, ancestors)) = segments.split_last() else {
            continue;
        };

        let mut parent = Tree::ROOT;
        let mut acc = if absolute { "/".to_string() } else { String::new() };
        for (depth, segment) in ancestors.iter().enumerate() {
            acc = join_rel(&acc, segment);
            parent = match tree.find(&acc) {
                Some(id) => id,
                None => {
                    let dir = TreeNode::new(segment.to_string(), acc.clone(), true, depth);
                    tree.dir_count += 1;
                    tree.alloc(dir, parent)
                }
            };
        }

        let leaf_rel = join_rel(&acc, last);
        if let Some(existing) = tree.find(&leaf_rel) {
            // Already synthesized as a directory for an earlier path.
            if tree.nodes[existing].abs_path.as_os_str().is_empty() {
                tree.nodes[existing].abs_path = path.clone();
            }
            continue;
        }
        let mut leaf = TreeNode::new(last.to_string(), leaf_rel, false, ancestors.len());
        leaf.abs_path = path;
        tree.file_count += 1;
        leaves.push(tree.alloc(leaf, parent));
    }

    for id in leaves {
        let is_dir = matches!(fs.stat(&tree.nodes[id].abs_path), Ok(stat) if stat.is_dir);
        if is_dir {
            let node = &mut tree.nodes[id];
            node.is_dir = true;
            node.opaque = true;
            tree.file_count -= 1;
            tree.dir_count += 1;
        }
    }

    tree.sort_all_children();
    tree.auto_expand();
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::probe::fake::FakeFs;

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    fn names(tree: &Tree, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|id| tree.node(*id).name.clone()).collect()
    }

    #[test]
    fn dedup_removes_duplicates_and_subsumed_children() {
        let kept = dedup_subsumed(paths(&["/a/b", "/a/b", "/a/b/c", "/a/bc", "/a/b-x/y"]));
        assert_eq!(kept, paths(&["/a/b", "/a/b-x/y", "/a/bc"]));
    }

    #[test]
    fn builds_hierarchy_relative_to_base() {
        let tree = build_tree(
            &paths(&["/h/.config/nvim/init.lua", "/h/.bashrc", "/h/.config/git/config"]),
            Path::new("/h"),
            &FakeFs::new(),
        );

        assert_eq!(names(&tree, tree.top_level()), vec![".config", ".bashrc"]);
        let config = tree.find(".config").unwrap();
        assert!(tree.node(config).is_dir);
        assert!(tree.node(config).abs_path.as_os_str().is_empty());
        assert_eq!(tree.resolve_abs(config), PathBuf::from("/h/.config"));
        assert_eq!(names(&tree, &tree.node(config).children), vec!["git", "nvim"]);

        let init = tree.find(".config/nvim/init.lua").unwrap();
        assert_eq!(tree.node(init).depth, 2);
        assert_eq!(tree.node(init).abs_path, PathBuf::from("/h/.config/nvim/init.lua"));
        assert_eq!(tree.dir_count, 3);
        assert_eq!(tree.file_count, 3);
    }

    #[test]
    fn duplicate_and_subsumed_paths_yield_single_entry() {
        let tree = build_tree(
            &paths(&["/a/b", "/a/b", "/a/b/c"]),
            Path::new("/"),
            &FakeFs::new(),
        );
        assert!(tree.find("a/b").is_some());
        assert!(tree.find("a/b/c").is_none());
        let b = tree.find("a/b").unwrap();
        assert!(!tree.node(b).is_dir);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn drops_empty_and_base_paths() {
        let tree = build_tree(
            &paths(&["", "/h", "/h/", "/h/x"]),
            Path::new("/h"),
            &FakeFs::new(),
        );
        assert_eq!(tree.len(), 1);
        assert!(tree.find("x").is_some());
    }

    #[test]
    fn paths_outside_base_keep_full_form() {
        let tree = build_tree(&paths(&["/etc/hosts"]), Path::new("/h"), &FakeFs::new());
        let hosts = tree.find("/etc/hosts").unwrap();
        assert_eq!(tree.node(hosts).name, "hosts");
        let etc = tree.find("/etc").unwrap();
        assert_eq!(tree.resolve_abs(etc), PathBuf::from("/etc"));
    }

    #[test]
    fn leaf_directories_become_opaque() {
        let fs = FakeFs::new().dir("/h/projects").file("/h/.zshrc");
        let tree = build_tree(&paths(&["/h/projects", "/h/.zshrc"]), Path::new("/h"), &fs);

        let projects = tree.find("projects").unwrap();
        let node = tree.node(projects);
        assert!(node.is_dir);
        assert!(node.opaque);
        assert!(node.children.is_empty());
        assert!(!tree.node(tree.find(".zshrc").unwrap()).is_dir);
        assert_eq!(tree.dir_count, 1);
        assert_eq!(tree.file_count, 1);
    }

    #[test]
    fn stat_failure_leaves_leaf_as_file() {
        let tree = build_tree(&paths(&["/h/missing"]), Path::new("/h"), &FakeFs::new());
        let node = tree.node(tree.find("missing").unwrap());
        assert!(!node.is_dir);
        assert!(!node.opaque);
    }

    #[test]
    fn directories_sort_before_files() {
        let fs = FakeFs::new().dir("/h/zdir");
        let tree = build_tree(
            &paths(&["/h/b.txt", "/h/zdir", "/h/a.txt", "/h/adir/x"]),
            Path::new("/h"),
            &fs,
        );
        assert_eq!(
            names(&tree, tree.top_level()),
            vec!["adir", "zdir", "a.txt", "b.txt"]
        );
    }

    #[test]
    fn single_child_chains_auto_expand() {
        let tree = build_tree(
            &paths(&["/h/a/b/c.txt", "/h/x/1", "/h/x/2"]),
            Path::new("/h"),
            &FakeFs::new(),
        );
        assert!(tree.node(tree.find("a").unwrap()).expanded);
        assert!(tree.node(tree.find("a/b").unwrap()).expanded);
        assert!(!tree.node(tree.find("x").unwrap()).expanded);
    }

    #[test]
    fn expand_all_skips_opaque_dirs() {
        let fs = FakeFs::new().dir("/h/x/opaque");
        let mut tree = build_tree(
            &paths(&["/h/x/opaque", "/h/x/file"]),
            Path::new("/h"),
            &fs,
        );
        tree.expand_all();
        assert!(tree.node(tree.find("x").unwrap()).expanded);
        assert!(!tree.node(tree.find("x/opaque").unwrap()).expanded);
    }

    #[test]
    fn parent_back_reference() {
        let tree = build_tree(&paths(&["/h/a/b"]), Path::new("/h"), &FakeFs::new());
        let b = tree.find("a/b").unwrap();
        let a = tree.find("a").unwrap();
        assert_eq!(tree.parent(b), Some(a));
        assert_eq!(tree.parent(a), None);
    }

    #[test]
    fn populate_fills_opaque_directory() {
        let fs = FakeFs::new().dir("/h/proj");
        let mut tree = build_tree(&paths(&["/h/proj", "/h/other"]), Path::new("/h"), &fs);
        let proj = tree.find("proj").unwrap();
        tree.begin_loading(proj, 7);
        assert!(tree.node(proj).loading);

        tree.populate(
            proj,
            vec![
                DirEntryInfo {
                    name: "z.txt".into(),
                    is_dir: false,
                },
                DirEntryInfo {
                    name: "src".into(),
                    is_dir: true,
                },
            ],
        );

        let node = tree.node(proj);
        assert!(!node.opaque);
        assert!(node.expanded);
        assert!(!node.loading);
        assert_eq!(names(&tree, &tree.node(proj).children), vec!["src", "z.txt"]);

        let src = tree.find("proj/src").unwrap();
        assert!(tree.node(src).opaque);
        assert_eq!(tree.node(src).depth, 1);
        assert_eq!(tree.node(src).abs_path, PathBuf::from("/h/proj/src"));
        assert_eq!(tree.parent(src), Some(proj));
    }

    #[test]
    fn collapsed_dirs_round_trip() {
        let mut tree = build_tree(
            &paths(&["/h/a/1", "/h/a/2", "/h/b/1", "/h/b/2"]),
            Path::new("/h"),
            &FakeFs::new(),
        );
        tree.expand_all();
        tree.node_mut(tree.find("b").unwrap()).expanded = false;
        let collapsed = tree.collapsed_dirs();
        assert_eq!(collapsed, HashSet::from(["b".to_string()]));

        let mut rebuilt = tree.clone();
        rebuilt.expand_all();
        rebuilt.apply_collapsed(&collapsed);
        assert!(rebuilt.node(rebuilt.find("a").unwrap()).expanded);
        assert!(!rebuilt.node(rebuilt.find("b").unwrap()).expanded);
    }
}
