// Tests for building the file tree from flat listings

use kbnav_client::FileRecord;
use kbnav_core::tree::{FileTree, TreeNode, build_tree};
use std::collections::HashSet;

fn collect_paths(nodes: &[TreeNode], out: &mut Vec<String>) {
    for node in nodes {
        out.push(node.path.clone());
        collect_paths(&node.children, out);
    }
}

fn sample() -> Vec<FileRecord> {
    vec![
        FileRecord::file("projects/kb/readme.md"),
        FileRecord::dir("projects"),
        FileRecord::file("index.md"),
        FileRecord::file("projects/kb/design.md"),
        FileRecord::dir("projects/kb"),
        FileRecord::file("journal/2024/01.md"),
    ]
}

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn test_build_twice_is_identical() {
    let records = sample();
    assert_eq!(build_tree(&records), build_tree(&records));
}

#[test]
fn test_input_order_does_not_matter() {
    let records = sample();
    let mut reversed = records.clone();
    reversed.reverse();

    assert_eq!(build_tree(&records), build_tree(&reversed));
}

// ============================================================================
// Uniqueness
// ============================================================================

#[test]
fn test_one_node_per_distinct_path() {
    let tree = build_tree(&sample());
    let mut paths = Vec::new();
    collect_paths(&tree, &mut paths);

    let unique: HashSet<&String> = paths.iter().collect();
    assert_eq!(unique.len(), paths.len());
    // projects, projects/kb, 2 docs, index.md, journal, journal/2024, 01.md
    assert_eq!(paths.len(), 8);
}

#[test]
fn test_node_path_is_join_of_ancestor_names() {
    fn check(nodes: &[TreeNode], prefix: &str) {
        for node in nodes {
            let expected = if prefix.is_empty() {
                node.name.clone()
            } else {
                format!("{}/{}", prefix, node.name)
            };
            assert_eq!(node.path, expected);
            check(&node.children, &node.path);
        }
    }
    check(&build_tree(&sample()), "");
}

// ============================================================================
// Directory inference
// ============================================================================

#[test]
fn test_implied_directory_without_record() {
    let tree = build_tree(&[FileRecord::file("a/b.md")]);

    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].path, "a");
    assert!(tree[0].is_dir);
    assert_eq!(tree[0].children.len(), 1);
    assert_eq!(tree[0].children[0].path, "a/b.md");
    assert!(!tree[0].children[0].is_dir);
}

#[test]
fn test_explicit_empty_directory() {
    let tree = build_tree(&[FileRecord::dir("inbox")]);
    assert!(tree[0].is_dir);
    assert!(tree[0].children.is_empty());
}

#[test]
fn test_children_sorted_by_path() {
    let tree = FileTree::from_records(&[
        FileRecord::file("n/z.md"),
        FileRecord::file("n/a.md"),
        FileRecord::file("n/M.md"),
    ]);
    let names: Vec<&str> = tree.roots[0].children.iter().map(|c| c.name.as_str()).collect();

    // Code-point order: uppercase first.
    assert_eq!(names, vec!["M.md", "a.md", "z.md"]);
}
