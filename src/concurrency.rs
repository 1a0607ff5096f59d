//! Per-transaction exclusive access
//!
//! Cloning reads the clones table, writes node revisions, then records the clone.
//! That sequence must not interleave with another writer on the same
//! transaction, so every open transaction is reached through one shared handle
//! guarding it with an exclusive lock. Different transactions do not block each
//! other.

use crate::tree::txn::Transaction;
use crate::types::TxnId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared handle to an open transaction. `None` once committed or aborted.
pub type TxnHandle = Arc<Mutex<Option<Transaction>>>;

/// Table of open transaction handles
pub struct TxnTable {
    open: RwLock<HashMap<TxnId, TxnHandle>>,
}

impl TxnTable {
    pub fn new() -> Self {
        Self {
            open: RwLock::new(HashMap::new()),
        }
    }

    /// Register a freshly created transaction.
    pub fn insert(&self, txn: Transaction) -> TxnHandle {
        let id = txn.id.clone();
        let handle = Arc::new(Mutex::new(Some(txn)));
        self.open.write().insert(id, handle.clone());
        handle
    }

    /// Get the handle for `id`, loading the transaction with `load` on first use.
    ///
    /// `load` runs with the table write-locked, so it cannot interleave with
    /// [`TxnTable::remove`]. A closer that deletes the stored record before
    /// removing the handle never sees the record come back as a fresh handle.
    /// `load` must not touch the table.
    pub fn get_or_load<E, F>(&self, id: &TxnId, load: F) -> Result<TxnHandle, E>
    where
        F: FnOnce() -> Result<Transaction, E>,
    {
        {
            let open = self.open.read();
            if let Some(handle) = open.get(id) {
                return Ok(handle.clone());
            }
        }

        let mut open = self.open.write();
        if let Some(handle) = open.get(id) {
            return Ok(handle.clone());
        }
        let handle = Arc::new(Mutex::new(Some(load()?)));
        open.insert(id.clone(), handle.clone());
        Ok(handle)
    }

    /// Forget the handle for `id`. Holders of the handle keep it, but see `None`
    /// if the transaction was closed through it.
    pub fn remove(&self, id: &TxnId) {
        self.open.write().remove(id);
    }

    pub fn open_count(&self) -> usize {
        self.open.read().len()
    }
}

impl Default for TxnTable {
    fn default() -> Self {
        Self::new()
    }
}
