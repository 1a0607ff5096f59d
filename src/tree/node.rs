//! Node revisions: the stored form of one file or directory at one point in history

use crate::types::{NodeID, TxnId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Directory,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::File => f.write_str("file"),
            NodeKind::Directory => f.write_str("dir"),
        }
    }
}

/// Node content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeData {
    File { contents: Vec<u8> },
    Directory { entries: BTreeMap<String, NodeID> },
}

/// One node revision
///
/// `txn_id` is set while the node revision is mutable inside that transaction.
/// Committing the transaction clears it, after which the node revision never
/// changes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRevision {
    pub data: NodeData,
    pub props: BTreeMap<String, String>,
    pub predecessor: Option<NodeID>,
    pub txn_id: Option<TxnId>,
}

impl NodeRevision {
    pub fn empty_file(txn_id: Option<TxnId>) -> Self {
        Self {
            data: NodeData::File {
                contents: Vec::new(),
            },
            props: BTreeMap::new(),
            predecessor: None,
            txn_id,
        }
    }

    pub fn empty_dir(txn_id: Option<TxnId>) -> Self {
        Self {
            data: NodeData::Directory {
                entries: BTreeMap::new(),
            },
            props: BTreeMap::new(),
            predecessor: None,
            txn_id,
        }
    }

    /// Successor for a clone: same content, pointing back at `base`, owned by `txn_id`.
    pub fn successor(&self, base: &NodeID, txn_id: &TxnId) -> Self {
        Self {
            data: self.data.clone(),
            props: self.props.clone(),
            predecessor: Some(base.clone()),
            txn_id: Some(txn_id.clone()),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::File { .. } => NodeKind::File,
            NodeData::Directory { .. } => NodeKind::Directory,
        }
    }

    pub fn is_mutable(&self) -> bool {
        self.txn_id.is_some()
    }

    pub fn entries(&self) -> Option<&BTreeMap<String, NodeID>> {
        match &self.data {
            NodeData::Directory { entries } => Some(entries),
            NodeData::File { .. } => None,
        }
    }

    pub fn entries_mut(&mut self) -> Option<&mut BTreeMap<String, NodeID>> {
        match &mut self.data {
            NodeData::Directory { entries } => Some(entries),
            NodeData::File { .. } => None,
        }
    }

    pub fn contents(&self) -> Option<&[u8]> {
        match &self.data {
            NodeData::File { contents } => Some(contents),
            NodeData::Directory { .. } => None,
        }
    }
}
