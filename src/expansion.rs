use crate::folder::FolderNode;
use crate::tree;
use std::collections::{HashMap, HashSet};

/// Tracks which folders have their children shown.
///
/// Lives for one browsing session and survives forest rebuilds; ids are
/// matched against each new forest by equality only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionState {
    expanded: HashSet<String>,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, id: &str) {
        if !self.expanded.remove(id) {
            self.expanded.insert(id.to_string());
        }
    }

    pub fn expand(&mut self, id: &str) {
        self.expanded.insert(id.to_string());
    }

    pub fn collapse(&mut self, id: &str) {
        self.expanded.remove(id);
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    pub fn len(&self) -> usize {
        self.expanded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expanded.is_empty()
    }

    /// Expand every ancestor of `id` so the folder becomes visible.
    /// The folder itself is left as it was.
    pub fn expand_ancestors_of(&mut self, id: &str, forest: &[FolderNode]) {
        let parents: HashMap<&str, Option<&str>> = tree::flatten(forest)
            .into_iter()
            .map(|node| (node.id.as_str(), node.parent_id.as_deref()))
            .collect();

        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = parents.get(id).copied().flatten();
        while let Some(parent_id) = current {
            if !seen.insert(parent_id) {
                break;
            }
            self.expanded.insert(parent_id.to_string());
            current = parents.get(parent_id).copied().flatten();
        }
    }

    /// Expand every folder `other` has expanded
    pub fn extend(&mut self, other: &ExpansionState) {
        self.expanded.extend(other.expanded.iter().cloned());
    }

    /// Expand every folder that has children
    pub fn expand_all(&mut self, forest: &[FolderNode]) {
        for node in tree::flatten(forest) {
            if node.has_children {
                self.expanded.insert(node.id.clone());
            }
        }
    }

    /// Forget ids that are no longer in `forest`
    pub fn retain_known(&mut self, forest: &[FolderNode]) {
        let known: HashSet<&str> = tree::flatten(forest)
            .into_iter()
            .map(|node| node.id.as_str())
            .collect();
        self.expanded.retain(|id| known.contains(id.as_str()));
    }

    /// Whether a renderer should show the children of `node`
    pub fn shows_children(&self, node: &FolderNode) -> bool {
        node.has_children && self.is_expanded(&node.id)
    }

    /// Nodes a tree view renders, in order, with their indentation level
    pub fn visible_rows<'a>(&self, forest: &'a [FolderNode]) -> Vec<(usize, &'a FolderNode)> {
        let mut rows = Vec::new();
        let mut stack: Vec<(usize, &FolderNode)> = forest.iter().rev().map(|node| (0, node)).collect();
        while let Some((level, node)) = stack.pop() {
            rows.push((level, node));
            if self.shows_children(node) {
                stack.extend(node.children.iter().rev().map(|child| (level + 1, child)));
            }
        }
        rows
    }
}
