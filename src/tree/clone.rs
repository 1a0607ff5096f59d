//! Copy-on-write node cloning
//!
//! Making a node mutable inside a transaction means cloning it and every
//! directory above it up to the transaction root, then relinking each clone into
//! its (cloned) parent. Untouched subtrees keep pointing at the immutable node
//! revisions of the base revision. Each base node is cloned at most once per
//! transaction; the transaction's clones table remembers the result.

use crate::error::FsError;
use crate::store::NodeStore;
use crate::tree::path::NodePath;
use crate::tree::txn::{CloneState, Transaction};
use crate::types::NodeID;
use tracing::debug;

/// Return a mutable clone of the node at `path`, cloning ancestors as needed.
///
/// Repeated calls for the same base node return the same clone.
///
/// # Panics
///
/// Panics if `path` is a root path naming neither the transaction root nor its
/// base root; that means the transaction record is corrupt.
pub fn clone_path(
    store: &dyn NodeStore,
    txn: &mut Transaction,
    path: &NodePath,
) -> Result<NodeID, FsError> {
    let Some(parent) = path.parent.as_deref() else {
        return clone_root(store, txn, path);
    };

    match txn.clone_state(&path.id) {
        CloneState::ClonedAt(id) => Ok(id),
        CloneState::MovedTo {
            parent: new_parent,
            entry,
        } => {
            // One level only: the new parent must already be ours.
            if !txn.is_mutable(&new_parent) {
                return Err(FsError::UnsupportedMoveChain {
                    node: path.id.clone(),
                    parent: new_parent,
                });
            }
            let clone = clone_one(store, txn, path)?;
            store.change_directory_entry(&new_parent, &entry, Some(&clone))?;
            Ok(clone)
        }
        CloneState::NotCloned => {
            let parent_clone = clone_path(store, txn, parent)?;
            let clone = clone_one(store, txn, path)?;
            store.change_directory_entry(&parent_clone, &path.entry, Some(&clone))?;
            Ok(clone)
        }
    }
}

fn clone_root(
    store: &dyn NodeStore,
    txn: &mut Transaction,
    path: &NodePath,
) -> Result<NodeID, FsError> {
    if txn.root_cloned() {
        assert!(
            path.id == txn.base_root || &path.id == txn.root(),
            "root path {} is neither base root {} nor root {} of txn {}",
            path.id,
            txn.base_root,
            txn.root(),
            txn.id
        );
        return Ok(txn.root().clone());
    }

    assert_eq!(
        path.id, txn.base_root,
        "root path does not match the base root of txn {}",
        txn.id
    );
    clone_one(store, txn, path)
}

/// Create a successor of the node at `path` and record it in `txn`.
fn clone_one(
    store: &dyn NodeStore,
    txn: &mut Transaction,
    path: &NodePath,
) -> Result<NodeID, FsError> {
    let base = store.get_node_revision(&path.id)?;
    let successor = base.successor(&path.id, &txn.id);
    let clone = store.create_successor(&path.id, &successor)?;

    if path.is_root() {
        txn.record_new_root(clone.clone());
    } else {
        txn.record_clone(path.id.clone(), clone.clone());
    }

    debug!(
        txn = %txn.id,
        base = %path.id,
        clone = %clone,
        path = %path.to_path_string(),
        "Cloned node revision"
    );
    Ok(clone)
}
