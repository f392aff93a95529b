use crate::catalog::FileEntry;
use crate::tree::node::{NodeId, NodeType, TreeNode};
use crate::tree::RestoreTree;

/// `X:` style first path segment.
pub(crate) fn is_drive(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl RestoreTree {
    fn add_child(&mut self, parent: NodeId, name: &str, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(TreeNode::new(name, Some(parent), node_type));
        self.node_mut(parent).children.insert(name.to_string(), id);
        id
    }

    /// Detaches a node and its subtree, e.g. a delta chain with a missing link.
    fn drop_node(&mut self, id: NodeId) {
        let (parent, name, marked) = {
            let node = self.node(id);
            (node.parent, node.name.clone(), node.marked_below)
        };
        if let Some(parent) = parent {
            self.node_mut(parent).children.remove(&name);
            let mut cur = Some(parent);
            while let Some(n) = cur {
                let node = self.node_mut(n);
                node.marked_below = node.marked_below.saturating_sub(marked);
                cur = node.parent;
            }
        }
        self.node_mut(id).dropped = true;
        self.hard_links.retain(|_, v| *v != id);
        if self.cwd == id {
            self.cwd = self.root;
        }
    }

    /// Adds one catalog row. Rows must arrive in ascending job id order so that
    /// later jobs replace earlier versions of the same path. Returns the node,
    /// or `None` when the row was discarded.
    pub fn insert(&mut self, entry: &FileEntry) -> Option<NodeId> {
        let is_dir = entry.path.ends_with('/');
        let segments: Vec<&str> = entry.path.split('/').filter(|s| !s.is_empty()).collect();
        let (last, parents) = segments.split_last()?;
        let windows = segments.first().map(|s| is_drive(s)).unwrap_or(false);

        let mut cur = self.root;
        for segment in parents {
            cur = match self.child(cur, segment) {
                Some(id) => id,
                None => {
                    let kind = if windows && cur == self.root {
                        NodeType::WindowsDir
                    } else {
                        NodeType::NewDir
                    };
                    self.add_child(cur, segment, kind)
                }
            };
        }

        let node_type = match (is_dir, windows) {
            (true, true) => NodeType::WindowsDir,
            (true, false) => NodeType::Dir,
            (false, _) => NodeType::File,
        };

        let existing = self.child(cur, last);
        let id = match existing {
            Some(id) => {
                if entry.delta_seq > 0 {
                    let prev = self.node(id).delta_seq;
                    if entry.delta_seq == prev + 1 {
                        let node = self.node_mut(id);
                        node.delta_seq = entry.delta_seq;
                        node.delta_parts.push((entry.job_id, entry.file_index));
                        return Some(id);
                    }
                    log::debug!(
                        "Dropping {}: delta {} does not follow {}",
                        entry.path,
                        entry.delta_seq,
                        prev
                    );
                    self.drop_node(id);
                    return None;
                }
                if self.node(id).is_link_primary() && entry.link_fi != 0 {
                    return Some(id);
                }
                id
            }
            None => {
                if entry.delta_seq > 0 {
                    log::debug!("Dropping {}: delta {} has no base", entry.path, entry.delta_seq);
                    return None;
                }
                self.add_child(cur, last, node_type)
            }
        };

        let node = self.node_mut(id);
        node.node_type = node_type;
        node.job_id = entry.job_id;
        node.file_index = entry.file_index;
        node.delta_seq = 0;
        node.delta_parts.clear();
        node.soft_link = entry.soft_link;
        node.hard_link = entry.nlink > 1;
        node.link_fi = if node.hard_link { entry.link_fi } else { 0 };

        if entry.nlink > 1 && entry.link_fi == 0 {
            self.hard_links.insert((entry.job_id, entry.file_index), id);
        }
        Some(id)
    }
}
