use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// Stable index of a node in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Root,
    Dir,
    WindowsDir,
    File,
    /// Directory created only to hold a deeper path.
    NewDir,
    Unknown,
}

impl NodeType {
    pub fn is_dir(&self) -> bool {
        matches!(
            self,
            NodeType::Root | NodeType::Dir | NodeType::WindowsDir | NodeType::NewDir
        )
    }
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    pub parent: Option<NodeId>,
    pub(crate) children: BTreeMap<String, NodeId>,
    pub node_type: NodeType,
    pub extract: bool,
    /// Marked nodes in this subtree, self included.
    pub(crate) marked_below: u32,
    pub job_id: JobId,
    pub file_index: u32,
    pub delta_seq: u32,
    /// Later delta versions chained onto this file, in sequence order.
    pub delta_parts: Vec<(JobId, u32)>,
    pub soft_link: bool,
    pub hard_link: bool,
    /// File index of the primary entry for a secondary hard link, 0 otherwise.
    pub link_fi: u32,
    /// Detached from the tree; kept in the arena so ids stay stable.
    pub(crate) dropped: bool,
}

impl TreeNode {
    pub(crate) fn new(name: &str, parent: Option<NodeId>, node_type: NodeType) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: BTreeMap::new(),
            node_type,
            extract: false,
            marked_below: 0,
            job_id: JobId(0),
            file_index: 0,
            delta_seq: 0,
            delta_parts: Vec::new(),
            soft_link: false,
            hard_link: false,
            link_fi: 0,
            dropped: false,
        }
    }

    /// True iff this node or something below it is marked for extraction.
    pub fn extract_descendant(&self) -> bool {
        self.marked_below > 0
    }

    pub fn is_dir(&self) -> bool {
        self.node_type.is_dir()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn child_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }

    /// Primary entry of a hard-link set.
    pub fn is_link_primary(&self) -> bool {
        self.hard_link && self.link_fi == 0
    }
}
