//! In-memory node revision store

use super::{KeyTable, NodeStore};
use crate::error::StorageError;
use crate::key_gen;
use crate::tree::node::NodeRevision;
use crate::tree::txn::Transaction;
use crate::types::{NodeID, Revnum, TxnId};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};

/// Store backed by process memory; contents are lost on drop.
#[derive(Default)]
pub struct MemoryNodeStore {
    nodes: RwLock<HashMap<NodeID, NodeRevision>>,
    /// Index is the revision number
    revisions: RwLock<Vec<NodeID>>,
    txns: RwLock<BTreeMap<TxnId, Transaction>>,
    next_keys: Mutex<HashMap<KeyTable, String>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of node revisions stored
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }
}

impl NodeStore for MemoryNodeStore {
    fn get_node_revision(&self, id: &NodeID) -> Result<NodeRevision, StorageError> {
        self.nodes
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NodeNotFound(id.clone()))
    }

    fn put_node_revision(&self, id: &NodeID, rev: &NodeRevision) -> Result<(), StorageError> {
        self.nodes.write().insert(id.clone(), rev.clone());
        Ok(())
    }

    fn delete_node_revision(&self, id: &NodeID) -> Result<(), StorageError> {
        self.nodes.write().remove(id);
        Ok(())
    }

    fn allocate_key(&self, table: KeyTable) -> Result<String, StorageError> {
        let mut next_keys = self.next_keys.lock();
        let slot = next_keys
            .entry(table)
            .or_insert_with(|| key_gen::FIRST_KEY.to_string());
        let key = slot.clone();
        *slot = key_gen::next_key(&key)?;
        Ok(key)
    }

    fn youngest_revision(&self) -> Result<Option<Revnum>, StorageError> {
        let revisions = self.revisions.read();
        Ok(revisions.len().checked_sub(1).map(|rev| rev as Revnum))
    }

    fn revision_root(&self, rev: Revnum) -> Result<NodeID, StorageError> {
        self.revisions
            .read()
            .get(rev as usize)
            .cloned()
            .ok_or(StorageError::NoSuchRevision(rev))
    }

    fn record_revision(&self, rev: Revnum, root: &NodeID) -> Result<(), StorageError> {
        let mut revisions = self.revisions.write();
        if rev as usize != revisions.len() {
            return Err(StorageError::Corrupt(format!(
                "revision r{} recorded out of order (next is r{})",
                rev,
                revisions.len()
            )));
        }
        revisions.push(root.clone());
        Ok(())
    }

    fn get_txn(&self, id: &TxnId) -> Result<Transaction, StorageError> {
        self.txns
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::TxnNotFound(id.clone()))
    }

    fn put_txn(&self, txn: &Transaction) -> Result<(), StorageError> {
        self.txns.write().insert(txn.id.clone(), txn.clone());
        Ok(())
    }

    fn delete_txn(&self, id: &TxnId) -> Result<(), StorageError> {
        self.txns.write().remove(id);
        Ok(())
    }

    fn list_txns(&self) -> Result<Vec<TxnId>, StorageError> {
        Ok(self.txns.read().keys().cloned().collect())
    }
}
