//! In-memory project tree with hierarchical mark state.
//!
//! Nodes live in a flat arena addressed by [`NodeId`]. The walk inserts every parent before
//! its children, so bottom-up passes are a single reverse sweep over the arena.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::app::filter::PathFilter;
use crate::domain::errors::TreeError;
use crate::domain::model::{NodeId, TreeNode};

const ROOT: NodeId = NodeId(0);

/// Snapshot of the project directory plus per-node mark and expansion state.
#[derive(Debug, Clone)]
pub struct TreeModel {
    nodes: Vec<TreeNode>,
}

impl TreeModel {
    /// Walk `root` and build the tree, admitting only entries accepted by `filter`.
    ///
    /// Unreadable subtrees are skipped with a warning; an unreadable root is fatal.
    pub fn build(root: &Path, filter: &PathFilter) -> Result<Self, TreeError> {
        let root = fs::canonicalize(root).map_err(|source| TreeError::RootUnavailable {
            path: root.to_path_buf(),
            source,
        })?;
        let metadata = fs::metadata(&root).map_err(|source| TreeError::RootUnavailable {
            path: root.clone(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(TreeError::RootNotDirectory(root));
        }
        fs::read_dir(&root).map_err(|source| TreeError::RootUnavailable {
            path: root.clone(),
            source,
        })?;

        let mut nodes = vec![TreeNode {
            name: display_name(&root),
            path: root.clone(),
            is_dir: true,
            parent: None,
            children: Vec::new(),
            expanded: true,
            marked: false,
            size: 0,
        }];
        let mut dirs: HashMap<PathBuf, NodeId> = HashMap::new();
        dirs.insert(root.clone(), ROOT);

        let mut builder = WalkBuilder::new(&root);
        builder
            .standard_filters(false)
            .git_ignore(filter.respect_gitignore())
            .follow_links(true);
        builder.filter_entry({
            let filter = filter.clone();
            move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                filter.admits(entry.path(), is_dir)
            }
        });

        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }

            let path = entry.path().to_path_buf();
            let Some(parent) = path.parent().and_then(|p| dirs.get(p)).copied() else {
                tracing::debug!(path = %path.display(), "entry without a known parent");
                continue;
            };
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            let size = if is_dir {
                0
            } else {
                entry.metadata().map(|meta| meta.len()).unwrap_or_else(|err| {
                    tracing::debug!(path = %path.display(), error = %err, "size unavailable");
                    0
                })
            };

            let id = NodeId(nodes.len());
            nodes.push(TreeNode {
                name: display_name(&path),
                path: path.clone(),
                is_dir,
                parent: Some(parent),
                children: Vec::new(),
                expanded: false,
                marked: false,
                size,
            });
            nodes[parent.0].children.push(id);
            if is_dir {
                dirs.insert(path, id);
            }
        }

        let mut tree = Self { nodes };
        tree.sort_children();
        tree.recompute_sizes();
        tracing::debug!(root = %root.display(), nodes = tree.nodes.len(), "tree built");
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn root_path(&self) -> &Path {
        &self.nodes[ROOT.0].path
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Locate the node for an absolute path inside the tree.
    pub fn find(&self, path: &Path) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.path == path)
            .map(NodeId)
    }

    /// Recompute every directory size as the sum of its children.
    pub fn recompute_sizes(&mut self) {
        for node in self.nodes.iter_mut().filter(|node| node.is_dir) {
            node.size = 0;
        }
        for index in (1..self.nodes.len()).rev() {
            let size = self.nodes[index].size;
            if let Some(parent) = self.nodes[index].parent {
                self.nodes[parent.0].size += size;
            }
        }
    }

    /// Flip the mark on `id`; directories force the new value onto their whole subtree.
    pub fn toggle_mark(&mut self, id: NodeId) {
        let value = !self.nodes[id.0].marked;
        self.set_mark(id, value);
    }

    /// Set the mark on `id` and, for directories, on every descendant.
    pub fn set_mark(&mut self, id: NodeId, value: bool) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current.0];
            node.marked = value;
            stack.extend(node.children.iter().copied());
        }
    }

    /// True when some, but not all, file descendants of a directory are marked.
    pub fn has_partial_marks(&self, id: NodeId) -> bool {
        if !self.nodes[id.0].is_dir {
            return false;
        }
        let (marked, total) = self.count_file_marks(id);
        marked > 0 && marked < total
    }

    fn count_file_marks(&self, id: NodeId) -> (usize, usize) {
        let mut marked = 0;
        let mut total = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current.0];
            if node.is_dir {
                stack.extend(node.children.iter().copied());
            } else {
                total += 1;
                if node.marked {
                    marked += 1;
                }
            }
        }
        (marked, total)
    }

    /// Reconcile marks with persisted manifest paths.
    ///
    /// Files are marked iff their resolved path is listed. A directory is marked iff it has
    /// at least one direct file child and all direct file children are marked; nested
    /// subdirectories do not take part in that decision.
    pub fn mark_from_manifest(&mut self, paths: &BTreeSet<PathBuf>) {
        for node in self.nodes.iter_mut().filter(|node| !node.is_dir) {
            let resolved = fs::canonicalize(&node.path).unwrap_or_else(|_| node.path.clone());
            node.marked = paths.contains(&resolved) || paths.contains(&node.path);
        }

        for index in (0..self.nodes.len()).rev() {
            if !self.nodes[index].is_dir {
                continue;
            }
            let mut files = self.nodes[index]
                .children
                .iter()
                .map(|child| &self.nodes[child.0])
                .filter(|child| !child.is_dir)
                .peekable();
            let has_files = files.peek().is_some();
            let all_marked = files.all(|child| child.marked);
            self.nodes[index].marked = has_files && all_marked;
        }
    }

    /// Every marked file in tree order.
    pub fn marked_files(&self) -> Vec<PathBuf> {
        self.preorder(ROOT, false)
            .into_iter()
            .map(|(id, _)| &self.nodes[id.0])
            .filter(|node| !node.is_dir && node.marked)
            .map(|node| node.path.clone())
            .collect()
    }

    pub fn marked_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| !node.is_dir && node.marked)
            .count()
    }

    pub fn toggle_expand(&mut self, id: NodeId) {
        let expanded = self.nodes[id.0].expanded;
        self.set_expanded(id, !expanded);
    }

    /// Change expansion of a directory; files stay collapsed.
    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) {
        let node = &mut self.nodes[id.0];
        if node.is_dir {
            node.expanded = expanded;
        }
    }

    /// Rows shown by the interactive view: pre-order, descending only into expanded
    /// directories, paired with their depth.
    pub fn visible_rows(&self) -> Vec<(NodeId, usize)> {
        self.preorder(ROOT, true)
    }

    /// Draw the complete tree with box connectors, rooted at `.`.
    pub fn render_ascii(&self) -> String {
        let mut out = String::from(".\n");
        let mut stack: Vec<(NodeId, String, bool)> = self.nodes[ROOT.0]
            .children
            .iter()
            .enumerate()
            .rev()
            .map(|(idx, child)| {
                let last = idx + 1 == self.nodes[ROOT.0].children.len();
                (*child, String::new(), last)
            })
            .collect();

        while let Some((id, prefix, last)) = stack.pop() {
            let node = &self.nodes[id.0];
            let connector = if last { "└── " } else { "├── " };
            out.push_str(&prefix);
            out.push_str(connector);
            out.push_str(&node.name);
            if node.is_dir {
                out.push('/');
            }
            out.push('\n');

            let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
            let count = node.children.len();
            for (idx, child) in node.children.iter().enumerate().rev() {
                stack.push((*child, child_prefix.clone(), idx + 1 == count));
            }
        }
        out
    }

    fn preorder(&self, start: NodeId, only_expanded: bool) -> Vec<(NodeId, usize)> {
        let mut rows = Vec::new();
        let mut stack = vec![(start, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            rows.push((id, depth));
            let node = &self.nodes[id.0];
            if node.is_dir && (node.expanded || !only_expanded) {
                for child in node.children.iter().rev() {
                    stack.push((*child, depth + 1));
                }
            }
        }
        rows
    }

    fn sort_children(&mut self) {
        for index in 0..self.nodes.len() {
            let mut children = std::mem::take(&mut self.nodes[index].children);
            children.sort_by_cached_key(|child| {
                let node = &self.nodes[child.0];
                (!node.is_dir, node.name.to_lowercase(), node.name.clone())
            });
            self.nodes[index].children = children;
        }
    }
}

/// Human readable size, right-aligned to a fixed width.
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B  ", "KB ", "MB ", "GB "] {
        if size < 1024.0 {
            return format!("{size:6.1}{unit}");
        }
        size /= 1024.0;
    }
    format!("{size:6.1}TB ")
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
