//! Transactions and their clones table

use crate::types::{NodeID, Revnum, TxnId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What a transaction has done with one base node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneState {
    NotCloned,
    ClonedAt(NodeID),
    /// Renamed under `parent`, which is already a clone in this transaction.
    MovedTo { parent: NodeID, entry: String },
}

/// Stored form of a clones-table row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloneRecord {
    ClonedAt(NodeID),
    MovedTo { parent: NodeID, entry: String },
}

/// A revision under construction
///
/// The clones table is owned here, so whoever holds `&mut Transaction` is the
/// only writer of that table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxnId,
    pub base_rev: Revnum,
    pub base_root: NodeID,
    root: NodeID,
    clones: BTreeMap<NodeID, CloneRecord>,
    /// Node revisions created by this transaction
    mutable: BTreeSet<NodeID>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(id: TxnId, base_rev: Revnum, base_root: NodeID) -> Self {
        Self {
            id,
            base_rev,
            root: base_root.clone(),
            base_root,
            clones: BTreeMap::new(),
            mutable: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    /// Current root of the transaction tree
    pub fn root(&self) -> &NodeID {
        &self.root
    }

    /// Whether the root has been cloned in this transaction
    pub fn root_cloned(&self) -> bool {
        self.root != self.base_root
    }

    pub fn is_mutable(&self, id: &NodeID) -> bool {
        self.mutable.contains(id)
    }

    pub fn mutable_nodes(&self) -> impl Iterator<Item = &NodeID> {
        self.mutable.iter()
    }

    /// Clone state of `base`. A node created by this transaction counts as
    /// already cloned onto itself.
    pub fn clone_state(&self, base: &NodeID) -> CloneState {
        if self.mutable.contains(base) {
            return CloneState::ClonedAt(base.clone());
        }
        match self.clones.get(base) {
            Some(CloneRecord::ClonedAt(id)) => CloneState::ClonedAt(id.clone()),
            Some(CloneRecord::MovedTo { parent, entry }) => CloneState::MovedTo {
                parent: parent.clone(),
                entry: entry.clone(),
            },
            None => CloneState::NotCloned,
        }
    }

    pub fn record_new_root(&mut self, id: NodeID) {
        self.mutable.insert(id.clone());
        self.root = id;
    }

    pub fn record_clone(&mut self, base: NodeID, clone: NodeID) {
        self.mutable.insert(clone.clone());
        self.clones.insert(base, CloneRecord::ClonedAt(clone));
    }

    pub fn record_move(&mut self, base: NodeID, parent: NodeID, entry: String) {
        self.clones
            .insert(base, CloneRecord::MovedTo { parent, entry });
    }

    /// Record a node created from scratch in this transaction.
    pub fn record_created(&mut self, id: NodeID) {
        self.mutable.insert(id);
    }

    /// Number of rows in the clones table
    pub fn clone_count(&self) -> usize {
        self.clones.len()
    }
}
