//! Node Revision Store
//!
//! The backing store the tree layer orchestrates. Implementations provide atomic
//! get/put of node revisions, revision roots and transaction records, plus key
//! allocation from ordered key tables.

pub mod memory;
pub mod persistence;

use crate::error::StorageError;
use crate::tree::node::NodeRevision;
use crate::tree::txn::Transaction;
use crate::types::{NodeID, Revnum, TxnId};

pub use memory::MemoryNodeStore;
pub use persistence::SledNodeStore;

/// Tables that hand out keys from `key_gen`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTable {
    Nodes,
    Transactions,
}

impl KeyTable {
    pub fn name(&self) -> &'static str {
        match self {
            KeyTable::Nodes => "nodes",
            KeyTable::Transactions => "transactions",
        }
    }
}

/// Node revision store interface
pub trait NodeStore: Send + Sync {
    fn get_node_revision(&self, id: &NodeID) -> Result<NodeRevision, StorageError>;
    fn put_node_revision(&self, id: &NodeID, rev: &NodeRevision) -> Result<(), StorageError>;
    fn delete_node_revision(&self, id: &NodeID) -> Result<(), StorageError>;

    /// Hand out the next unused key of `table`.
    fn allocate_key(&self, table: KeyTable) -> Result<String, StorageError>;

    /// Youngest committed revision, or `None` for a store never initialized.
    fn youngest_revision(&self) -> Result<Option<Revnum>, StorageError>;
    fn revision_root(&self, rev: Revnum) -> Result<NodeID, StorageError>;
    fn record_revision(&self, rev: Revnum, root: &NodeID) -> Result<(), StorageError>;

    fn get_txn(&self, id: &TxnId) -> Result<Transaction, StorageError>;
    fn put_txn(&self, txn: &Transaction) -> Result<(), StorageError>;
    fn delete_txn(&self, id: &TxnId) -> Result<(), StorageError>;
    fn list_txns(&self) -> Result<Vec<TxnId>, StorageError>;

    /// Make everything written so far durable.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Store `rev` under a fresh id.
    fn create_node(&self, rev: &NodeRevision) -> Result<NodeID, StorageError> {
        let id = NodeID::new(self.allocate_key(KeyTable::Nodes)?);
        self.put_node_revision(&id, rev)?;
        Ok(id)
    }

    /// Store `rev` as the successor of `base_id` under a fresh id.
    fn create_successor(
        &self,
        base_id: &NodeID,
        rev: &NodeRevision,
    ) -> Result<NodeID, StorageError> {
        if rev.predecessor.as_ref() != Some(base_id) {
            return Err(StorageError::Corrupt(format!(
                "successor of {} names predecessor {:?}",
                base_id, rev.predecessor
            )));
        }
        self.create_node(rev)
    }

    /// Point `name` in the mutable directory `parent` at `child`, or remove the
    /// entry when `child` is `None`.
    fn change_directory_entry(
        &self,
        parent: &NodeID,
        name: &str,
        child: Option<&NodeID>,
    ) -> Result<(), StorageError> {
        let mut rev = self.get_node_revision(parent)?;
        if !rev.is_mutable() {
            return Err(StorageError::Corrupt(format!(
                "attempt to change entry {:?} of immutable node {}",
                name, parent
            )));
        }
        let entries = rev
            .entries_mut()
            .ok_or_else(|| StorageError::NotADirectory(parent.clone()))?;
        match child {
            Some(child) => {
                entries.insert(name.to_string(), child.clone());
            }
            None => {
                entries.remove(name);
            }
        }
        self.put_node_revision(parent, &rev)
    }

    /// Current root of the transaction and root of its base revision
    fn get_txn_and_base_roots(&self, id: &TxnId) -> Result<(NodeID, NodeID), StorageError> {
        let txn = self.get_txn(id)?;
        let base_root = self.revision_root(txn.base_rev)?;
        Ok((txn.root().clone(), base_root))
    }
}
