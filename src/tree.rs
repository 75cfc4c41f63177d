// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::{HashMap, HashSet};
use std::path::MAIN_SEPARATOR;
use std::sync::Arc;

use crate::filter::FilesFilter;
use crate::model::{Download, FileKey, FileRecord, FileRef};
use crate::natural;

/// Arena index. Ids follow depth-first pre-order, so the subtree of `n` is
/// exactly the id range `n..subtree_end(n)`.
pub type NodeId = usize;

pub const EXPANSION_ATTRIBUTE: &str = "files.view.expanded";

#[derive(Debug, Clone)]
pub enum NodeKind {
    Inner {
        children: Vec<NodeId>,
        /// Set on the node that stands for a whole download.
        download: Option<usize>,
    },
    Leaf {
        record: Arc<dyn FileRecord>,
        download: usize,
    },
}

#[derive(Debug, Clone)]
pub struct FileNode {
    pub name: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    end: NodeId,
}

impl FileNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    pub fn record(&self) -> Option<&Arc<dyn FileRecord>> {
        match &self.kind {
            NodeKind::Leaf { record, .. } => Some(record),
            NodeKind::Inner { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipState {
    AllSkipped,
    NoneSkipped,
    Mixed,
}

/// Outcome of a bulk skip change. Failures never roll back other leaves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkipReport {
    pub changed: usize,
    pub failed: Vec<FileKey>,
}

impl SkipReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A selected file together with the folder it was selected through, as
/// segments relative to its download. `None` when the file itself was picked.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub file: FileRef,
    pub folder: Option<Vec<String>>,
}

pub fn same_record(a: &Arc<dyn FileRecord>, b: &Arc<dyn FileRecord>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// Construction-time node. Flattened into the arena once sorted.
struct Draft {
    name: String,
    children: Vec<Draft>,
    record: Option<Arc<dyn FileRecord>>,
    download: Option<usize>,
}

impl Draft {
    fn inner(name: String, download: Option<usize>) -> Self {
        Self {
            name,
            children: Vec::new(),
            record: None,
            download,
        }
    }

    fn insert(&mut self, segments: &[&str], record: Arc<dyn FileRecord>, download: usize) {
        let Some((name, rest)) = segments.split_first() else {
            return;
        };

        if rest.is_empty() {
            self.children.push(Draft {
                name: name.to_string(),
                children: Vec::new(),
                record: Some(record),
                download: Some(download),
            });
            return;
        }

        let idx = match self
            .children
            .iter()
            .position(|c| c.record.is_none() && c.name == *name)
        {
            Some(idx) => idx,
            None => {
                self.children.push(Draft::inner(name.to_string(), None));
                self.children.len() - 1
            }
        };
        self.children[idx].insert(rest, record, download);
    }

    fn sort_recursive(&mut self) {
        self.children
            .sort_by(|a, b| natural::compare(&a.name, &b.name));
        for child in &mut self.children {
            child.sort_recursive();
        }
    }

    fn flatten(self, parent: Option<NodeId>, nodes: &mut Vec<FileNode>) -> NodeId {
        let id = nodes.len();
        let kind = match self.record {
            Some(record) => NodeKind::Leaf {
                record,
                download: self.download.unwrap_or_default(),
            },
            None => NodeKind::Inner {
                children: Vec::new(),
                download: self.download,
            },
        };
        nodes.push(FileNode {
            name: self.name,
            parent,
            kind,
            end: id + 1,
        });

        let child_ids: Vec<NodeId> = self
            .children
            .into_iter()
            .map(|child| child.flatten(Some(id), nodes))
            .collect();

        let end = nodes.len();
        let node = &mut nodes[id];
        node.end = end;
        if let NodeKind::Inner { children, .. } = &mut node.kind {
            *children = child_ids;
        }
        id
    }
}

pub(crate) fn split_path(relative_path: &str) -> Vec<&str> {
    relative_path
        .split(|c| c == MAIN_SEPARATOR || c == '/')
        .filter(|s| !s.is_empty())
        .collect()
}

fn download_draft(index: usize, name: String, download: &dyn Download) -> Draft {
    let mut draft = Draft::inner(name, Some(index));
    match download.file_set() {
        Ok(records) => {
            for record in records {
                let path = record.relative_path();
                let segments = split_path(&path);
                if segments.is_empty() {
                    draft.insert(&[path.as_str()], record, index);
                } else {
                    draft.insert(&segments, record, index);
                }
            }
        }
        Err(e) => {
            tracing::warn!(
                "Could not read files of '{}', showing it empty: {}",
                download.display_name(),
                e
            );
            draft.children.clear();
        }
    }
    draft
}

/// The synthesized file hierarchy of one or more downloads. Rebuilt
/// wholesale whenever its inputs change.
#[derive(Debug, Clone)]
pub struct FileTree {
    nodes: Vec<FileNode>,
    downloads: Vec<Arc<dyn Download>>,
}

impl FileTree {
    pub fn build(downloads: &[Arc<dyn Download>]) -> Self {
        let mut root = if downloads.len() == 1 {
            let download = &downloads[0];
            download_draft(0, download.display_name(), download.as_ref())
        } else {
            let names: Vec<String> = downloads.iter().map(|d| d.display_name()).collect();
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for name in &names {
                *counts.entry(name.as_str()).or_default() += 1;
            }

            let mut root = Draft::inner(String::new(), None);
            for (i, download) in downloads.iter().enumerate() {
                let name = if counts.get(names[i].as_str()).copied().unwrap_or(0) > 1 {
                    format!("{}. {}", i + 1, names[i])
                } else {
                    names[i].clone()
                };
                root.children
                    .push(download_draft(i, name, download.as_ref()));
            }
            root
        };

        // Download nodes keep input order; only their contents are sorted.
        if downloads.len() == 1 {
            root.sort_recursive();
        } else {
            for child in &mut root.children {
                child.sort_recursive();
            }
        }

        let mut nodes = Vec::new();
        root.flatten(None, &mut nodes);

        tracing::debug!(
            downloads = downloads.len(),
            nodes = nodes.len(),
            "Built file tree"
        );

        Self {
            nodes,
            downloads: downloads.to_vec(),
        }
    }

    pub fn from_download(download: Arc<dyn Download>) -> Self {
        Self::build(&[download])
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    pub fn node(&self, id: NodeId) -> Option<&FileNode> {
        self.nodes.get(id)
    }

    pub fn name(&self, id: NodeId) -> &str {
        self.nodes.get(id).map(|n| n.name.as_str()).unwrap_or("")
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Inner { children, .. }) => children,
            _ => &[],
        }
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(FileNode::is_leaf)
    }

    pub fn record(&self, id: NodeId) -> Option<&Arc<dyn FileRecord>> {
        self.nodes.get(id).and_then(FileNode::record)
    }

    pub fn subtree_end(&self, id: NodeId) -> NodeId {
        self.nodes.get(id).map(|n| n.end).unwrap_or(id)
    }

    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.leaves_under(self.root())
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    fn leaves_under(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        (id..self.subtree_end(id)).filter(|&n| self.nodes[n].is_leaf())
    }

    pub fn leaf_records(&self, id: NodeId) -> Vec<Arc<dyn FileRecord>> {
        self.leaves_under(id)
            .filter_map(|n| self.record(n).cloned())
            .collect()
    }

    pub fn downloads(&self) -> &[Arc<dyn Download>] {
        &self.downloads
    }

    /// Nodes that stand for a whole download, in input order.
    pub fn download_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n.kind, NodeKind::Inner { download: Some(_), .. }))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn download_of(&self, id: NodeId) -> Option<&Arc<dyn Download>> {
        let mut current = Some(id);
        while let Some(n) = current {
            match self.nodes.get(n).map(|node| &node.kind) {
                Some(NodeKind::Leaf { download, .. })
                | Some(NodeKind::Inner {
                    download: Some(download),
                    ..
                }) => return self.downloads.get(*download),
                Some(NodeKind::Inner { download: None, .. }) => current = self.parent(n),
                None => return None,
            }
        }
        None
    }

    pub fn file_ref(&self, id: NodeId) -> Option<FileRef> {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Leaf { record, download }) => self
                .downloads
                .get(*download)
                .map(|d| FileRef::new(d.clone(), record.clone())),
            _ => None,
        }
    }

    pub fn file_refs(&self, id: NodeId) -> Vec<FileRef> {
        self.leaves_under(id)
            .filter_map(|n| self.file_ref(n))
            .collect()
    }

    /// Segments from the download node (exclusive) down to `id`.
    pub fn path_of(&self, id: NodeId) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = id;
        while let Some(node) = self.nodes.get(current) {
            if matches!(node.kind, NodeKind::Inner { download: Some(_), .. }) {
                break;
            }
            let Some(parent) = node.parent else {
                break;
            };
            segments.push(node.name.clone());
            current = parent;
        }
        segments.reverse();
        segments
    }

    pub fn find_leaf(&self, download_id: &str, index: usize) -> Option<NodeId> {
        self.leaves().find(|&n| {
            self.record(n)
                .is_some_and(|r| r.index() == index && r.download_id() == download_id)
        })
    }

    pub fn length(&self, id: NodeId) -> u64 {
        self.leaves_under(id)
            .filter_map(|n| self.record(n))
            .map(|r| r.length())
            .sum()
    }

    pub fn downloaded(&self, id: NodeId) -> u64 {
        self.leaves_under(id)
            .filter_map(|n| self.record(n))
            .map(|r| r.downloaded())
            .sum()
    }

    pub fn skipped_state(&self, id: NodeId) -> SkipState {
        if let Some(record) = self.record(id) {
            return if record.is_skipped() {
                SkipState::AllSkipped
            } else {
                SkipState::NoneSkipped
            };
        }
        self.contributing_state(id).unwrap_or(SkipState::NoneSkipped)
    }

    // `None` for pad files and for folders with nothing else below them.
    fn contributing_state(&self, id: NodeId) -> Option<SkipState> {
        if let Some(record) = self.record(id) {
            if record.is_pad_file() {
                return None;
            }
            return Some(if record.is_skipped() {
                SkipState::AllSkipped
            } else {
                SkipState::NoneSkipped
            });
        }

        let mut state = None;
        for &child in self.children(id) {
            match (state, self.contributing_state(child)) {
                (_, None) => {}
                (_, Some(SkipState::Mixed)) => return Some(SkipState::Mixed),
                (None, Some(s)) => state = Some(s),
                (Some(a), Some(b)) if a != b => return Some(SkipState::Mixed),
                _ => {}
            }
        }
        state
    }

    /// Applies the flag to every leaf below `id`, depth-first.
    pub fn set_skipped(&self, id: NodeId, skipped: bool) -> SkipReport {
        let mut report = SkipReport::default();
        for leaf in self.leaves_under(id) {
            let Some(record) = self.record(leaf) else {
                continue;
            };
            if record.set_skipped(skipped) {
                report.changed += 1;
            } else {
                tracing::warn!(
                    "Skip change to {} rejected for {}: {}",
                    skipped,
                    record.key(),
                    record.last_error().unwrap_or_else(|| "unknown".to_string())
                );
                report.failed.push(record.key());
            }
        }
        report
    }

    /// Expands selected nodes into their files. A file reached through a
    /// folder remembers that folder; the first selection that covers a file
    /// wins.
    pub fn selected_files(&self, selected: &HashSet<NodeId>) -> Vec<SelectedFile> {
        let mut ordered: Vec<NodeId> = selected.iter().copied().collect();
        ordered.sort_unstable();

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for id in ordered {
            let folder = if self.is_leaf(id) {
                None
            } else {
                Some(self.path_of(id))
            };
            for leaf in self.leaves_under(id) {
                if !seen.insert(leaf) {
                    continue;
                }
                if let Some(file) = self.file_ref(leaf) {
                    out.push(SelectedFile {
                        file,
                        folder: folder.clone(),
                    });
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeViewState {
    pub cursor: Option<NodeId>,
    pub expanded: HashSet<NodeId>,
    pub selected: HashSet<NodeId>,
    pub top_most_offset: usize,
}

impl TreeViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expand_all(&mut self, tree: &FileTree) {
        for id in 0..tree.len() {
            if !tree.is_leaf(id) {
                self.expanded.insert(id);
            }
        }
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }
}

/// Persists expansion per download, as node offsets relative to the
/// download node, in the download's attribute map.
pub struct ExpansionStore;

impl ExpansionStore {
    pub fn save(tree: &FileTree, state: &TreeViewState) {
        for download_node in tree.download_nodes() {
            let Some(download) = tree.download_of(download_node) else {
                continue;
            };
            let end = tree.subtree_end(download_node);
            let mut offsets: Vec<usize> = state
                .expanded
                .iter()
                .filter(|&&id| id >= download_node && id < end)
                .map(|&id| id - download_node)
                .collect();
            offsets.sort_unstable();

            let value = if offsets.is_empty() {
                None
            } else {
                Some(
                    offsets
                        .iter()
                        .map(|o| o.to_string())
                        .collect::<Vec<_>>()
                        .join(","),
                )
            };
            download.set_attribute(EXPANSION_ATTRIBUTE, value);
        }
    }

    /// Unknown or out-of-range entries are ignored. The root always starts
    /// expanded.
    pub fn restore(tree: &FileTree) -> TreeViewState {
        let mut state = TreeViewState::new();
        state.expanded.insert(tree.root());

        for download_node in tree.download_nodes() {
            let Some(saved) = tree
                .download_of(download_node)
                .and_then(|d| d.attribute(EXPANSION_ATTRIBUTE))
            else {
                continue;
            };
            let end = tree.subtree_end(download_node);
            for token in saved.split(',') {
                let Ok(offset) = token.trim().parse::<usize>() else {
                    tracing::debug!("Ignoring expansion entry '{}'", token);
                    continue;
                };
                let Some(id) = download_node.checked_add(offset) else {
                    continue;
                };
                if id < end && !tree.is_leaf(id) {
                    state.expanded.insert(id);
                }
            }
        }
        state
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    pub id: NodeId,
    pub depth: usize,
    pub is_last: bool,
    pub is_expanded: bool,
    pub is_selected: bool,
    pub is_cursor: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TreeAction {
    Up,
    Down,
    Left,
    Right,
}

pub struct TreeMathHelper;

impl TreeMathHelper {
    /// Rows below the root, sliced to the scroll window.
    pub fn visible_rows(
        tree: &FileTree,
        state: &TreeViewState,
        filter: &FilesFilter,
        max_height: usize,
    ) -> Vec<RenderItem> {
        let full_list = Self::all_rows(tree, state, filter);

        let start = state.top_most_offset.min(full_list.len());
        let end = (start + max_height).min(full_list.len());

        if start < end {
            full_list[start..end].to_vec()
        } else {
            Vec::new()
        }
    }

    pub fn all_rows(tree: &FileTree, state: &TreeViewState, filter: &FilesFilter) -> Vec<RenderItem> {
        let mut full_list = Vec::new();
        Self::project_recursive(tree, tree.root(), state, filter, 0, &mut full_list);
        full_list
    }

    pub fn apply_action(
        state: &mut TreeViewState,
        tree: &FileTree,
        action: TreeAction,
        filter: &FilesFilter,
        max_height: usize,
    ) -> bool {
        let full_list = Self::all_rows(tree, state, filter);
        Self::handle_action(state, tree, &full_list, action, max_height)
    }

    pub fn is_visible(tree: &FileTree, id: NodeId, filter: &FilesFilter) -> bool {
        if let Some(record) = tree.record(id) {
            return filter.matches_record(record.as_ref());
        }
        if filter.hide_dnd && tree.skipped_state(id) == SkipState::AllSkipped {
            return false;
        }
        let children = tree.children(id);
        if children.is_empty() {
            return !filter.is_active();
        }
        children.iter().any(|&c| Self::is_visible(tree, c, filter))
    }

    fn project_recursive(
        tree: &FileTree,
        parent: NodeId,
        state: &TreeViewState,
        filter: &FilesFilter,
        depth: usize,
        output: &mut Vec<RenderItem>,
    ) {
        let is_searching = filter.is_text_active();
        let visible: Vec<NodeId> = tree
            .children(parent)
            .iter()
            .copied()
            .filter(|&id| Self::is_visible(tree, id, filter))
            .collect();

        let len = visible.len();
        for (i, id) in visible.into_iter().enumerate() {
            let is_dir = !tree.is_leaf(id);
            let expanded = is_dir && (is_searching || state.expanded.contains(&id));

            output.push(RenderItem {
                id,
                depth,
                is_last: i == len - 1,
                is_expanded: expanded,
                is_selected: state.selected.contains(&id),
                is_cursor: state.cursor == Some(id),
            });

            if expanded {
                Self::project_recursive(tree, id, state, filter, depth + 1, output);
            }
        }
    }

    fn handle_action(
        state: &mut TreeViewState,
        tree: &FileTree,
        full_list: &[RenderItem],
        action: TreeAction,
        max_height: usize,
    ) -> bool {
        if full_list.is_empty() {
            return false;
        }

        let current_idx = state
            .cursor
            .and_then(|id| full_list.iter().position(|item| item.id == id))
            .unwrap_or(0);

        let mut new_idx = current_idx;

        match action {
            TreeAction::Up => new_idx = current_idx.saturating_sub(1),
            TreeAction::Down => {
                if current_idx < full_list.len() - 1 {
                    new_idx = current_idx + 1;
                }
            }
            TreeAction::Right => {
                let item = &full_list[current_idx];
                if !tree.is_leaf(item.id) {
                    if !state.expanded.contains(&item.id) {
                        state.expanded.insert(item.id);
                    } else if current_idx < full_list.len() - 1
                        && full_list[current_idx + 1].depth > item.depth
                    {
                        new_idx = current_idx + 1;
                    }
                }
            }
            TreeAction::Left => {
                let item = &full_list[current_idx];
                if !tree.is_leaf(item.id) && state.expanded.contains(&item.id) {
                    state.expanded.remove(&item.id);
                } else if item.depth > 0 {
                    if let Some(parent_idx) = full_list[0..current_idx]
                        .iter()
                        .rposition(|x| x.depth == item.depth - 1)
                    {
                        new_idx = parent_idx;
                    }
                }
            }
        }

        state.cursor = Some(full_list[new_idx].id);
        let effective_height = max_height.max(1);
        if new_idx < state.top_most_offset {
            state.top_most_offset = new_idx;
        } else if new_idx >= state.top_most_offset + effective_height {
            state.top_most_offset = (new_idx + 1).saturating_sub(effective_height);
        }
        true
    }
}
