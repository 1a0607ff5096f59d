//! Node paths: one materialized route from a node up to a transaction root

use crate::types::NodeID;

/// A node together with the chain of directories leading to it from the root.
///
/// Built per operation and dropped when the operation returns. Distinct paths
/// may end at the same `NodeID` when revisions share subtrees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePath {
    pub id: NodeID,
    pub parent: Option<Box<NodePath>>,
    /// Name of this node in its parent; empty for the root
    pub entry: String,
}

impl NodePath {
    pub fn root(id: NodeID) -> Self {
        Self {
            id,
            parent: None,
            entry: String::new(),
        }
    }

    /// Extend this path by one directory entry.
    pub fn child(self, entry: impl Into<String>, id: NodeID) -> Self {
        Self {
            id,
            parent: Some(Box::new(self)),
            entry: entry.into(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Number of entries between the root and this node
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self;
        while let Some(parent) = &cursor.parent {
            depth += 1;
            cursor = parent;
        }
        depth
    }

    /// Slash-separated path from the root, `/` for the root itself
    pub fn to_path_string(&self) -> String {
        let mut names = Vec::new();
        let mut cursor = self;
        while let Some(parent) = &cursor.parent {
            names.push(cursor.entry.as_str());
            cursor = parent;
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }
}

/// Split a slash-separated path into its non-empty components.
///
/// `.` and `..` are rejected.
pub fn components(path: &str) -> Option<Vec<&str>> {
    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    if parts.iter().any(|part| *part == "." || *part == "..") {
        return None;
    }
    Some(parts)
}
