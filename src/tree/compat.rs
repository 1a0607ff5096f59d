//! Node handles over path-based roots
//!
//! A handle names a node by path inside either an open transaction or a fixed
//! revision. Every call opens a fresh root and reads through it, so a
//! transaction handle always reflects the transaction's current tree.

use crate::error::FsError;
use crate::fs::{Filesystem, Root};
use crate::tree::node::NodeKind;
use crate::types::{Revnum, TxnId};
use std::collections::BTreeMap;

/// Read access to one node, independent of what kind of root backs it
pub trait NodeHandle {
    /// Absolute path of the node within its root
    fn path(&self) -> &str;

    /// Kind recorded when the handle was created
    fn kind(&self) -> NodeKind;

    fn has_properties(&self) -> Result<bool, FsError>;

    fn file_length(&self) -> Result<u64, FsError>;

    /// Children of a directory, each wrapped as a handle of the same variant.
    fn directory_entries(&self) -> Result<BTreeMap<String, Box<dyn NodeHandle + '_>>, FsError>;
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// A node inside an open transaction
pub struct TxnNode<'a> {
    fs: &'a Filesystem,
    txn_id: TxnId,
    path: String,
    kind: NodeKind,
}

impl<'a> TxnNode<'a> {
    pub fn open(fs: &'a Filesystem, txn_id: &TxnId, path: &str) -> Result<Self, FsError> {
        let kind = fs.txn_root(txn_id)?.node_kind(path)?;
        Ok(Self {
            fs,
            txn_id: txn_id.clone(),
            path: path.to_string(),
            kind,
        })
    }

    pub fn txn_id(&self) -> &TxnId {
        &self.txn_id
    }

    fn root(&self) -> Result<Root<'a>, FsError> {
        self.fs.txn_root(&self.txn_id)
    }
}

impl NodeHandle for TxnNode<'_> {
    fn path(&self) -> &str {
        &self.path
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn has_properties(&self) -> Result<bool, FsError> {
        self.root()?.has_properties(&self.path)
    }

    fn file_length(&self) -> Result<u64, FsError> {
        self.root()?.file_length(&self.path)
    }

    fn directory_entries(&self) -> Result<BTreeMap<String, Box<dyn NodeHandle + '_>>, FsError> {
        let entries = self.root()?.dir_entries(&self.path)?;
        Ok(entries
            .into_iter()
            .map(|(name, entry)| {
                let handle: Box<dyn NodeHandle + '_> = Box::new(TxnNode {
                    fs: self.fs,
                    txn_id: self.txn_id.clone(),
                    path: child_path(&self.path, &name),
                    kind: entry.kind,
                });
                (name, handle)
            })
            .collect())
    }
}

/// A node in a committed revision
pub struct RevisionNode<'a> {
    fs: &'a Filesystem,
    rev: Revnum,
    path: String,
    kind: NodeKind,
}

impl<'a> RevisionNode<'a> {
    pub fn open(fs: &'a Filesystem, rev: Revnum, path: &str) -> Result<Self, FsError> {
        let kind = fs.revision_root(rev)?.node_kind(path)?;
        Ok(Self {
            fs,
            rev,
            path: path.to_string(),
            kind,
        })
    }

    pub fn revision(&self) -> Revnum {
        self.rev
    }

    fn root(&self) -> Result<Root<'a>, FsError> {
        self.fs.revision_root(self.rev)
    }
}

impl NodeHandle for RevisionNode<'_> {
    fn path(&self) -> &str {
        &self.path
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn has_properties(&self) -> Result<bool, FsError> {
        self.root()?.has_properties(&self.path)
    }

    fn file_length(&self) -> Result<u64, FsError> {
        self.root()?.file_length(&self.path)
    }

    fn directory_entries(&self) -> Result<BTreeMap<String, Box<dyn NodeHandle + '_>>, FsError> {
        let entries = self.root()?.dir_entries(&self.path)?;
        Ok(entries
            .into_iter()
            .map(|(name, entry)| {
                let handle: Box<dyn NodeHandle + '_> = Box::new(RevisionNode {
                    fs: self.fs,
                    rev: self.rev,
                    path: child_path(&self.path, &name),
                    kind: entry.kind,
                });
                (name, handle)
            })
            .collect())
    }
}
