use crate::error::TreeError;
use crate::tree::node::NodeId;
use crate::tree::RestoreTree;

impl RestoreTree {
    /// Marks every node `pattern` resolves to, with its subtree. Returns how
    /// many nodes went from unmarked to marked.
    pub fn mark(&mut self, pattern: &str) -> Result<usize, TreeError> {
        self.apply(pattern, true)
    }

    /// Inverse of [`mark`](Self::mark).
    pub fn unmark(&mut self, pattern: &str) -> Result<usize, TreeError> {
        self.apply(pattern, false)
    }

    fn apply(&mut self, pattern: &str, extract: bool) -> Result<usize, TreeError> {
        let targets = self.resolve(pattern)?;
        let changed: usize = targets
            .into_iter()
            .map(|id| self.set_subtree(id, extract))
            .sum();
        log::debug!(
            "{} '{}': {} nodes changed",
            if extract { "mark" } else { "unmark" },
            pattern,
            changed
        );
        Ok(changed)
    }

    pub fn mark_node(&mut self, id: NodeId) -> usize {
        self.set_subtree(id, true)
    }

    pub fn unmark_node(&mut self, id: NodeId) -> usize {
        self.set_subtree(id, false)
    }

    fn set_subtree(&mut self, start: NodeId, extract: bool) -> usize {
        let mut changed = 0;
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            changed += self.set_extract(id, extract);

            let node = self.node(id);
            let primary = if extract && node.hard_link && node.link_fi != 0 {
                self.hard_links.get(&(node.job_id, node.link_fi)).copied()
            } else {
                None
            };
            if let Some(primary) = primary {
                changed += self.set_extract(primary, true);
            }
            stack.extend(self.node(id).child_ids());
        }
        changed
    }

    /// Flips one node's flag and keeps every ancestor's subtree count in step.
    fn set_extract(&mut self, id: NodeId, extract: bool) -> usize {
        if self.node(id).extract == extract {
            return 0;
        }
        self.node_mut(id).extract = extract;
        let mut cur = Some(id);
        while let Some(n) = cur {
            let node = self.node_mut(n);
            if extract {
                node.marked_below += 1;
            } else {
                node.marked_below = node.marked_below.saturating_sub(1);
            }
            cur = node.parent;
        }
        1
    }
}
