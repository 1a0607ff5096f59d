//! Sled-backed node revision store
//!
//! Trees:
//! - `nodes`: length-prefixed node key -> bincode `NodeRevision`
//! - `revisions`: big-endian revision number -> node key of the root
//! - `transactions`: length-prefixed txn key -> bincode `Transaction`
//! - `meta`: `next-key/<table>` -> next unused key
//!
//! Node and transaction keys are stored with `key_gen::encode_ordered` so sled's
//! byte order matches key order and range scans see keys in allocation order.

use super::{KeyTable, NodeStore};
use crate::error::StorageError;
use crate::key_gen;
use crate::tree::node::NodeRevision;
use crate::tree::txn::Transaction;
use crate::types::{NodeID, Revnum, TxnId};
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

pub struct SledNodeStore {
    db: sled::Db,
    nodes: sled::Tree,
    revisions: sled::Tree,
    transactions: sled::Tree,
    meta: sled::Tree,
    /// Serializes read-advance-write of the key counters.
    key_lock: Mutex<()>,
}

impl SledNodeStore {
    /// Open (or create) a store in the directory at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(path)?;
        let db = sled::open(path)?;
        info!(path = %path.display(), "Opened sled node store");
        Self::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            nodes: db.open_tree("nodes")?,
            revisions: db.open_tree("revisions")?,
            transactions: db.open_tree("transactions")?,
            meta: db.open_tree("meta")?,
            db,
            key_lock: Mutex::new(()),
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn next_key_name(table: KeyTable) -> String {
        format!("next-key/{}", table.name())
    }
}

impl NodeStore for SledNodeStore {
    fn get_node_revision(&self, id: &NodeID) -> Result<NodeRevision, StorageError> {
        let bytes = self
            .nodes
            .get(key_gen::encode_ordered(id.as_str()))?
            .ok_or_else(|| StorageError::NodeNotFound(id.clone()))?;
        Ok(bincode::deserialize(&bytes)?)
    }

    fn put_node_revision(&self, id: &NodeID, rev: &NodeRevision) -> Result<(), StorageError> {
        let bytes = bincode::serialize(rev)?;
        self.nodes
            .insert(key_gen::encode_ordered(id.as_str()), bytes)?;
        Ok(())
    }

    fn delete_node_revision(&self, id: &NodeID) -> Result<(), StorageError> {
        self.nodes.remove(key_gen::encode_ordered(id.as_str()))?;
        Ok(())
    }

    fn allocate_key(&self, table: KeyTable) -> Result<String, StorageError> {
        let _guard = self.key_lock.lock();
        let name = Self::next_key_name(table);
        let key = match self.meta.get(name.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes.to_vec()).map_err(|_| {
                StorageError::Corrupt(format!("non-UTF-8 key counter for {}", table.name()))
            })?,
            None => key_gen::FIRST_KEY.to_string(),
        };
        let next = key_gen::next_key(&key)?;
        self.meta.insert(name.as_bytes(), next.as_bytes())?;
        debug!(table = table.name(), key = %key, "Allocated key");
        Ok(key)
    }

    fn youngest_revision(&self) -> Result<Option<Revnum>, StorageError> {
        match self.revisions.last()? {
            Some((key, _)) => {
                let bytes: [u8; 8] = key[..].try_into().map_err(|_| {
                    StorageError::Corrupt("revision key is not 8 bytes".to_string())
                })?;
                Ok(Some(Revnum::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    fn revision_root(&self, rev: Revnum) -> Result<NodeID, StorageError> {
        let bytes = self
            .revisions
            .get(rev.to_be_bytes())?
            .ok_or(StorageError::NoSuchRevision(rev))?;
        let key = String::from_utf8(bytes.to_vec())
            .map_err(|_| StorageError::Corrupt(format!("non-UTF-8 root for r{}", rev)))?;
        Ok(NodeID::new(key))
    }

    fn record_revision(&self, rev: Revnum, root: &NodeID) -> Result<(), StorageError> {
        let expected = self.youngest_revision()?.map_or(0, |youngest| youngest + 1);
        if rev != expected {
            return Err(StorageError::Corrupt(format!(
                "revision r{} recorded out of order (next is r{})",
                rev, expected
            )));
        }
        self.revisions
            .insert(rev.to_be_bytes(), root.as_str().as_bytes())?;
        Ok(())
    }

    fn get_txn(&self, id: &TxnId) -> Result<Transaction, StorageError> {
        let bytes = self
            .transactions
            .get(key_gen::encode_ordered(id.as_str()))?
            .ok_or_else(|| StorageError::TxnNotFound(id.clone()))?;
        Ok(bincode::deserialize(&bytes)?)
    }

    fn put_txn(&self, txn: &Transaction) -> Result<(), StorageError> {
        let bytes = bincode::serialize(txn)?;
        self.transactions
            .insert(key_gen::encode_ordered(txn.id.as_str()), bytes)?;
        Ok(())
    }

    fn delete_txn(&self, id: &TxnId) -> Result<(), StorageError> {
        self.transactions
            .remove(key_gen::encode_ordered(id.as_str()))?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn list_txns(&self) -> Result<Vec<TxnId>, StorageError> {
        let mut ids = Vec::new();
        for item in self.transactions.iter() {
            let (key, _) = item?;
            ids.push(TxnId::new(key_gen::decode_ordered(&key)?));
        }
        Ok(ids)
    }
}
