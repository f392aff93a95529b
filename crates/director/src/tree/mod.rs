//! In-memory restore tree rebuilt from catalog file rows, used to pick what
//! a restore extracts.

mod insert;
mod mark;
mod resolve;
pub mod node;
mod walk;

use std::collections::HashMap;

use crate::bootstrap::BootstrapRecord;
use crate::catalog::Catalog;
use crate::error::{CatalogError, TreeError};
use crate::job::JobId;

pub use node::{NodeId, NodeType, TreeNode};
pub use walk::{ListEntry, Walk};

#[derive(Debug, Clone)]
pub struct RestoreTree {
    nodes: Vec<TreeNode>,
    root: NodeId,
    cwd: NodeId,
    /// Primary hard-link entries keyed by (job id, file index).
    hard_links: HashMap<(JobId, u32), NodeId>,
}

impl Default for RestoreTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RestoreTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![TreeNode::new("", None, NodeType::Root)],
            root: NodeId(0),
            cwd: NodeId(0),
            hard_links: HashMap::new(),
        }
    }

    /// Builds the tree from the file rows of `job_ids`, older jobs first.
    pub fn from_catalog(catalog: &dyn Catalog, job_ids: &[JobId]) -> Result<Self, CatalogError> {
        let mut tree = Self::new();
        let entries = catalog.file_entries(job_ids)?;
        log::debug!(
            "Building restore tree from {} file rows of {} jobs",
            entries.len(),
            job_ids.len()
        );
        for entry in &entries {
            tree.insert(entry);
        }
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn cwd(&self) -> NodeId {
        self.cwd
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        &mut self.nodes[id.index()]
    }

    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.node(id).children.get(name).copied()
    }

    /// Live nodes, root excluded.
    pub fn len(&self) -> usize {
        self.walk().count().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        !self.node(self.root).has_children()
    }

    /// Absolute path of a node; directories carry no trailing slash.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            let node = self.node(n);
            if node.parent.is_some() {
                parts.push(node.name.as_str());
            }
            cur = node.parent;
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    pub fn pwd(&self) -> String {
        if self.cwd == self.root {
            "/".to_string()
        } else {
            format!("{}/", self.path_of(self.cwd))
        }
    }

    /// Changes the working node to the first directory `path` resolves to.
    pub fn cd(&mut self, path: &str) -> Result<String, TreeError> {
        let targets = self.resolve(path)?;
        let first = targets
            .first()
            .copied()
            .ok_or_else(|| TreeError::NotFound(path.to_string()))?;
        match targets.iter().copied().find(|id| self.node(*id).is_dir()) {
            Some(dir) => {
                self.cwd = dir;
                Ok(self.pwd())
            }
            // A file can still be entered if something was stored beneath it.
            None if self.node(first).has_children() => {
                self.cwd = first;
                Ok(self.pwd())
            }
            None => Err(TreeError::NotADirectory(path.to_string())),
        }
    }

    pub fn marked_count(&self) -> usize {
        self.walk().filter(|(_, n)| n.extract).count()
    }

    /// `(job id, file index)` pairs to read back, delta parts included.
    pub fn selected(&self) -> Vec<(JobId, u32)> {
        let mut out = Vec::new();
        for (_, node) in self.walk() {
            if !node.extract || node.file_index == 0 {
                continue;
            }
            out.push((node.job_id, node.file_index));
            out.extend(node.delta_parts.iter().copied());
        }
        out
    }

    pub fn add_to_bootstrap(&self, bsr: &mut BootstrapRecord) -> usize {
        let selected = self.selected();
        for (job_id, file_index) in &selected {
            bsr.add_selection(*job_id, *file_index);
        }
        selected.len()
    }
}
