// Hierarchical file tree built from the flat file listing

use kbnav_client::FileRecord;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Represents a file or directory in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub children: Vec<TreeNode>,
    pub expanded: bool,
}

/// A node as seen by a flat, indented list view.
#[derive(Debug, Clone, Copy)]
pub struct TreeRow<'a> {
    pub depth: usize,
    pub node: &'a TreeNode,
}

struct Slot {
    name: String,
    path: String,
    is_dir: bool,
    children: Vec<usize>,
}

fn normalized_path(path: &str) -> String {
    path.split('/').filter(|p| !p.is_empty()).collect::<Vec<_>>().join("/")
}

/// Turn a flat list of path records into top-level tree roots.
///
/// Records are sorted by normalized path (code-point order) first, so the
/// output does not depend on input order or on stray separators. Every distinct path yields exactly one node; a
/// segment implied by a deeper path is a directory even without its own
/// record. Empty segments (leading, trailing or doubled `/`) are ignored.
pub fn build_tree(records: &[FileRecord]) -> Vec<TreeNode> {
    let mut sorted: Vec<&FileRecord> = records.iter().collect();
    sorted.sort_by_cached_key(|record| normalized_path(&record.path));

    let mut slots: Vec<Slot> = Vec::new();
    let mut by_path: HashMap<String, usize> = HashMap::new();
    let mut roots: Vec<usize> = Vec::new();
    let mut terminals: HashSet<String> = HashSet::new();

    for record in sorted {
        let parts: Vec<&str> = record.path.split('/').filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            warn!("Skipping file record with empty path: {:?}", record.path);
            continue;
        }

        let mut current_path = String::new();
        let mut parent: Option<usize> = None;

        for (i, part) in parts.iter().enumerate() {
            let terminal = i == parts.len() - 1;
            if !current_path.is_empty() {
                current_path.push('/');
            }
            current_path.push_str(part);

            let idx = match by_path.get(&current_path) {
                Some(&existing) => {
                    if !terminal {
                        // An earlier record named this prefix as a file.
                        slots[existing].is_dir = true;
                    } else {
                        let has_children = !slots[existing].children.is_empty();
                        slots[existing].is_dir = record.is_dir || has_children;
                    }
                    existing
                }
                None => {
                    let idx = slots.len();
                    slots.push(Slot {
                        name: part.to_string(),
                        path: current_path.clone(),
                        is_dir: !terminal || record.is_dir,
                        children: Vec::new(),
                    });
                    by_path.insert(current_path.clone(), idx);
                    match parent {
                        Some(p) => slots[p].children.push(idx),
                        None => roots.push(idx),
                    }
                    idx
                }
            };

            if terminal && !terminals.insert(current_path.clone()) {
                warn!("Duplicate file record for {}; keeping the latest", current_path);
            }
            parent = Some(idx);
        }
    }

    roots.iter().map(|&idx| materialize(&slots, idx)).collect()
}

fn materialize(slots: &[Slot], idx: usize) -> TreeNode {
    let slot = &slots[idx];
    TreeNode {
        name: slot.name.clone(),
        path: slot.path.clone(),
        is_dir: slot.is_dir,
        children: slot.children.iter().map(|&c| materialize(slots, c)).collect(),
        expanded: false,
    }
}

/// File tree owned by the UI state; rebuilt wholesale on every listing change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    pub roots: Vec<TreeNode>,
}

impl FileTree {
    pub fn from_records(records: &[FileRecord]) -> Self {
        Self {
            roots: build_tree(records),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        fn count(nodes: &[TreeNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        count(&self.roots)
    }

    /// Find a node by path
    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        Self::find_in(&self.roots, path)
    }

    fn find_in<'a>(nodes: &'a [TreeNode], path: &str) -> Option<&'a TreeNode> {
        for node in nodes {
            if node.path == path {
                return Some(node);
            }
            // Children share the parent's path as a prefix.
            if path.starts_with(&node.path)
                && path.as_bytes().get(node.path.len()) == Some(&b'/')
            {
                return Self::find_in(&node.children, path);
            }
        }
        None
    }

    /// Toggle expansion state of a directory. Returns the new state.
    pub fn toggle_expanded(&mut self, path: &str) -> Option<bool> {
        Self::toggle_in(&mut self.roots, path)
    }

    fn toggle_in(nodes: &mut [TreeNode], path: &str) -> Option<bool> {
        for node in nodes.iter_mut() {
            if node.path == path {
                if !node.is_dir {
                    return None;
                }
                node.expanded = !node.expanded;
                return Some(node.expanded);
            }
            if let Some(state) = Self::toggle_in(&mut node.children, path) {
                return Some(state);
            }
        }
        None
    }

    /// Paths of every expanded directory.
    pub fn expanded_paths(&self) -> HashSet<String> {
        fn collect(nodes: &[TreeNode], out: &mut HashSet<String>) {
            for node in nodes {
                if node.expanded {
                    out.insert(node.path.clone());
                }
                collect(&node.children, out);
            }
        }
        let mut out = HashSet::new();
        collect(&self.roots, &mut out);
        out
    }

    /// Re-apply expansion state after a rebuild.
    pub fn restore_expanded(&mut self, expanded: &HashSet<String>) {
        fn apply(nodes: &mut [TreeNode], expanded: &HashSet<String>) {
            for node in nodes {
                node.expanded = node.is_dir && expanded.contains(&node.path);
                apply(&mut node.children, expanded);
            }
        }
        apply(&mut self.roots, expanded);
    }

    /// Rows visible in an indented list: children of collapsed directories are hidden.
    pub fn visible_rows(&self) -> Vec<TreeRow<'_>> {
        fn walk<'a>(nodes: &'a [TreeNode], depth: usize, out: &mut Vec<TreeRow<'a>>) {
            for node in nodes {
                out.push(TreeRow { depth, node });
                if node.is_dir && node.expanded {
                    walk(&node.children, depth + 1, out);
                }
            }
        }
        let mut rows = Vec::new();
        walk(&self.roots, 0, &mut rows);
        rows
    }
}
