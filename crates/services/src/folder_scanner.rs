//! Folder scanner (spec §4.7): bounded depth-first tree walk with an
//! exclusion blocklist, plus three renderings: an ASCII tree for humans, a
//! flat list of `/`-normalized relative paths, and a `- `-bulleted,
//! count-truncated prompt-context form fed to the classifier.
//!
//! Grounded on the teacher's `WalkBuilder`-based traversal (formerly
//! `services::file_search`) and `original_source/.../context/folder_tree.py`
//! for the exact tree-rendering and depth/exclusion rules.

use ignore::WalkBuilder;
use shared::types::FolderNode;
use std::path::{Path, PathBuf};

/// Directory names never descended into, regardless of depth (spec §6).
pub const EXCLUDED_DIR_NAMES: &[&str] = &[
    ".git", ".svn", ".hg", ".idea", ".vscode", ".vs", "__pycache__", ".cache", ".npm", ".yarn",
    "$RECYCLE.BIN", "System Volume Information", "node_modules", ".Trash", ".Spotlight-V100",
    ".fseventsd", "AppData", "Application Data", "Library",
];

pub const DEFAULT_MAX_DEPTH: u32 = 3;

pub struct FolderScanner {
    max_depth: u32,
}

impl Default for FolderScanner {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH }
    }
}

/// Excluded if the name is in the fixed blocklist, or starts with `.` or
/// `~` (spec §4.7/§6).
fn is_excluded(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('~') || EXCLUDED_DIR_NAMES.iter().any(|e| *e == name)
}

impl FolderScanner {
    pub fn new(max_depth: u32) -> Self {
        Self { max_depth }
    }

    /// Walks `root` up to `max_depth` directories deep, skipping excluded
    /// names, and returns the resulting tree rooted at `root`.
    pub fn scan(&self, root: &Path) -> FolderNode {
        let name = root.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| root.display().to_string());
        let mut node = FolderNode { name, absolute_path: root.display().to_string(), depth: 0, children: Vec::new() };
        self.scan_into(root, 0, &mut node);
        node
    }

    fn scan_into(&self, dir: &Path, depth: u32, node: &mut FolderNode) {
        let Ok(entries) = std::fs::read_dir(dir) else { return };
        let mut entries: Vec<_> = entries.flatten().collect();
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !path.is_dir() {
                continue;
            }
            if is_excluded(&file_name) {
                continue;
            }
            if depth + 1 > self.max_depth {
                continue;
            }
            let mut child = FolderNode { name: file_name, absolute_path: path.display().to_string(), depth: depth + 1, children: Vec::new() };
            self.scan_into(&path, depth + 1, &mut child);
            node.children.push(child);
        }
    }

    /// Flat list of every directory under `root`, `root` included, honoring
    /// the same depth/exclusion rules as `scan`. Uses the teacher's
    /// `ignore::WalkBuilder` (also respecting `.gitignore`/`.git/info/exclude`
    /// like the teacher's `file_search` service does) rather than a bare
    /// recursive walk.
    pub fn flat_directories(&self, root: &Path) -> Vec<PathBuf> {
        let mut out = vec![root.to_path_buf()];
        for entry in self.walker(root).build().flatten() {
            if entry.file_type().is_some_and(|t| t.is_dir()) && entry.depth() > 0 {
                out.push(entry.path().to_path_buf());
            }
        }
        out
    }

    /// Total count of regular files reachable under `root` within
    /// `max_depth`, skipping excluded directories and anything
    /// `.gitignore`'d.
    pub fn count_files(&self, root: &Path) -> usize {
        self.walker(root)
            .build()
            .flatten()
            .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
            .count()
    }

    fn walker(&self, root: &Path) -> WalkBuilder {
        let mut builder = WalkBuilder::new(root);
        builder
            .max_depth(Some(self.max_depth as usize))
            .hidden(false)
            .ignore(true)
            .git_ignore(true)
            .git_exclude(true)
            .filter_entry(|e| !e.file_name().to_str().map(is_excluded).unwrap_or(false));
        builder
    }
}

/// Renders a node as an ASCII tree (spec §4.7), e.g.:
/// ```text
/// Documents/
/// ├── Invoices/
/// └── Receipts/
/// ```
pub fn render_ascii_tree(node: &FolderNode) -> String {
    let mut out = format!("{}/\n", node.name);
    render_children(&node.children, "", &mut out);
    out
}

fn render_children(children: &[FolderNode], prefix: &str, out: &mut String) {
    let count = children.len();
    for (i, child) in children.iter().enumerate() {
        let is_last = i + 1 == count;
        let connector = if is_last { "└── " } else { "├── " };
        out.push_str(&format!("{prefix}{connector}{}/\n", child.name));
        let child_prefix = if is_last { format!("{prefix}    ") } else { format!("{prefix}│   ") };
        render_children(&child.children, &child_prefix, out);
    }
}

/// Depth-first list of every folder's name under `node`, `node` included,
/// suitable for `classifier` destination validation.
pub fn flatten_names(node: &FolderNode) -> Vec<String> {
    let mut out = Vec::new();
    flatten_into(node, &mut out);
    out
}

fn flatten_into(node: &FolderNode, out: &mut Vec<String>) {
    out.push(node.name.clone());
    for child in &node.children {
        flatten_into(child, out);
    }
}

/// Flat list of every directory under `node`, `/`-normalized and relative to
/// `node` itself (which is excluded), e.g. `Invoices/2024` (spec §4.7).
pub fn flat_relative_paths(node: &FolderNode) -> Vec<String> {
    let mut out = Vec::new();
    for child in &node.children {
        collect_relative_paths(child, child.name.clone(), &mut out);
    }
    out
}

fn collect_relative_paths(node: &FolderNode, path: String, out: &mut Vec<String>) {
    out.push(path.clone());
    for child in &node.children {
        collect_relative_paths(child, format!("{path}/{}", child.name), out);
    }
}

/// Renders `node`'s directories as LLM prompt context (spec §4.6/§4.7): one
/// `/`-normalized relative path per line prefixed `- `, truncated to
/// `max_count` entries with a trailing note of how many were elided.
pub fn render_prompt_context(node: &FolderNode, max_count: usize) -> String {
    let paths = flat_relative_paths(node);
    let total = paths.len();
    let shown: Vec<String> = paths.into_iter().take(max_count).map(|p| format!("- {p}")).collect();
    let mut out = shown.join("\n");
    if total > max_count {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("... ({} more elided)", total - max_count));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn scan_builds_tree_and_skips_excluded_dirs() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("Invoices")).unwrap();
        fs::write(dir.path().join("Invoices/b.txt"), "y").unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/config"), "z").unwrap();

        let scanner = FolderScanner::default();
        let tree = scanner.scan(dir.path());
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].name, "Invoices");
        assert_eq!(scanner.count_files(dir.path()), 2);
    }

    #[test]
    fn scan_respects_max_depth() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c/d");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("deep.txt"), "x").unwrap();

        let scanner = FolderScanner::new(1);
        let tree = scanner.scan(dir.path());
        assert_eq!(tree.children.len(), 1);
        assert!(tree.children[0].children.is_empty());
    }

    #[test]
    fn ascii_tree_renders_branches() {
        let node = FolderNode {
            name: "root".into(),
            absolute_path: "root".into(),
            depth: 0,
            children: vec![
                FolderNode { name: "A".into(), absolute_path: "root/A".into(), depth: 1, children: vec![] },
                FolderNode { name: "B".into(), absolute_path: "root/B".into(), depth: 1, children: vec![] },
            ],
        };
        let rendered = render_ascii_tree(&node);
        assert!(rendered.contains("├── A/"));
        assert!(rendered.contains("└── B/"));
    }

    #[test]
    fn prompt_context_truncates_long_trees_with_elided_count() {
        let children: Vec<FolderNode> = (0..50)
            .map(|i| FolderNode { name: format!("dir{i}"), absolute_path: format!("dir{i}"), depth: 1, children: vec![] })
            .collect();
        let node = FolderNode { name: "root".into(), absolute_path: "root".into(), children, depth: 0 };
        let rendered = render_prompt_context(&node, 10);
        assert_eq!(rendered.lines().count(), 11);
        assert!(rendered.lines().take(10).all(|l| l.starts_with("- dir")));
        assert!(rendered.ends_with("(40 more elided)"));
    }

    #[test]
    fn flat_relative_paths_excludes_root_and_normalizes_nesting() {
        let node = FolderNode {
            name: "Documents".into(),
            absolute_path: "Documents".into(),
            depth: 0,
            children: vec![FolderNode {
                name: "Invoices".into(),
                absolute_path: "Documents/Invoices".into(),
                depth: 1,
                children: vec![FolderNode { name: "2024".into(), absolute_path: "Documents/Invoices/2024".into(), depth: 2, children: vec![] }],
            }],
        };
        assert_eq!(flat_relative_paths(&node), vec!["Invoices".to_string(), "Invoices/2024".to_string()]);
    }

    #[test]
    fn flatten_names_includes_nested_folders() {
        let node = FolderNode {
            name: "root".into(),
            absolute_path: "root".into(),
            depth: 0,
            children: vec![FolderNode { name: "child".into(), absolute_path: "root/child".into(), depth: 1, children: vec![] }],
        };
        assert_eq!(flatten_names(&node), vec!["root".to_string(), "child".to_string()]);
    }
}
