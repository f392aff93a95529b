//! Shell-style path patterns over the restore tree.

use std::collections::HashSet;

use glob::Pattern;

use crate::error::TreeError;
use crate::tree::insert::is_drive;
use crate::tree::node::NodeId;
use crate::tree::RestoreTree;

enum Segment {
    AnyDepth,
    Current,
    Parent,
    Glob(Pattern),
}

fn compile(segments: &[&str], pattern: &str) -> Result<Vec<Segment>, TreeError> {
    segments
        .iter()
        .map(|s| match *s {
            "**" => Ok(Segment::AnyDepth),
            "." => Ok(Segment::Current),
            ".." => Ok(Segment::Parent),
            other => Pattern::new(other)
                .map(Segment::Glob)
                .map_err(|e| TreeError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                }),
        })
        .collect()
}

impl RestoreTree {
    fn drive_child(&self, segment: &str) -> Option<NodeId> {
        self.node(self.root)
            .children
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(segment))
            .map(|(_, id)| *id)
    }

    /// Every node `pattern` names, in node order.
    ///
    /// A leading `/` anchors at the root. A leading `X:` anchors at that drive
    /// when the tree has it and is matched relative to the working node
    /// otherwise. `**` stands for any number of directory levels.
    pub fn resolve(&self, pattern: &str) -> Result<Vec<NodeId>, TreeError> {
        let raw: Vec<&str> = pattern.split('/').collect();
        let (start, rest): (NodeId, &[&str]) = if pattern.starts_with('/') {
            (self.root, &raw[1..])
        } else {
            match raw.first() {
                Some(first) if is_drive(first) => match self.drive_child(first) {
                    Some(drive) => (drive, &raw[1..]),
                    None => (self.cwd, &raw[..]),
                },
                _ => (self.cwd, &raw[..]),
            }
        };
        let names: Vec<&str> = rest.iter().copied().filter(|s| !s.is_empty()).collect();
        let segments = compile(&names, pattern)?;

        let mut found: Vec<NodeId> = Vec::new();
        let mut seen_found = HashSet::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];

        while let Some((id, at)) = stack.pop() {
            if !visited.insert((id, at)) {
                continue;
            }
            let Some(segment) = segments.get(at) else {
                if seen_found.insert(id) {
                    found.push(id);
                }
                continue;
            };

            let node = self.node(id);
            match segment {
                Segment::AnyDepth => {
                    stack.push((id, at + 1));
                    for child in node.child_ids() {
                        if self.node(child).is_dir() || self.node(child).has_children() {
                            stack.push((child, at));
                        }
                    }
                }
                Segment::Current => stack.push((id, at + 1)),
                Segment::Parent => stack.push((node.parent.unwrap_or(id), at + 1)),
                Segment::Glob(glob) => {
                    for (name, child) in &node.children {
                        if glob.matches(name) {
                            stack.push((*child, at + 1));
                        }
                    }
                }
            }
        }

        found.sort();
        Ok(found)
    }
}
