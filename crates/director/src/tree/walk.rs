use serde::Serialize;

use crate::tree::node::{NodeId, TreeNode};
use crate::tree::RestoreTree;

/// Preorder traversal yielding `(absolute path, node)`, children by name.
pub struct Walk<'t> {
    tree: &'t RestoreTree,
    stack: Vec<(NodeId, String)>,
}

impl<'t> Iterator for Walk<'t> {
    type Item = (String, &'t TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, path) = self.stack.pop()?;
        let node = self.tree.node(id);
        let base = if path == "/" { "" } else { path.as_str() };
        for (name, child) in node.children.iter().rev() {
            self.stack.push((*child, format!("{}/{}", base, name)));
        }
        Some((path, node))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub extract: bool,
    pub is_dir: bool,
}

impl std::fmt::Display for ListEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = if self.extract { "*" } else { "" };
        let slash = if self.is_dir { "/" } else { "" };
        write!(f, "{}{}{}", mark, self.name, slash)
    }
}

impl RestoreTree {
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            tree: self,
            stack: vec![(self.root, "/".to_string())],
        }
    }

    /// Children of the working node.
    pub fn ls(&self) -> Vec<ListEntry> {
        self.node(self.cwd)
            .children
            .iter()
            .map(|(name, id)| {
                let node = self.node(*id);
                ListEntry {
                    name: name.clone(),
                    extract: node.extract,
                    is_dir: node.is_dir() || node.has_children(),
                }
            })
            .collect()
    }
}
