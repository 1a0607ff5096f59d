//! Filesystem
//!
//! Revision roots, transaction lifecycle and path operations over a
//! `NodeStore`. Every mutation runs with the transaction's exclusive lock held
//! and goes through `clone_path`, so committed node revisions are never written.

use crate::cache::SyncPageCache;
use crate::concurrency::{TxnHandle, TxnTable};
use crate::config::{FsConfig, StorageBackend};
use crate::error::{FsError, StorageError};
use crate::store::{KeyTable, MemoryNodeStore, NodeStore, SledNodeStore};
use crate::tree::clone::clone_path;
use crate::tree::node::{NodeData, NodeKind, NodeRevision};
use crate::tree::path::{components, NodePath};
use crate::tree::txn::Transaction;
use crate::types::{NodeID, Revnum, TxnId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which tree a root reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootKind {
    Revision(Revnum),
    Transaction(TxnId),
}

/// One directory entry as seen through a root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub id: NodeID,
    pub kind: NodeKind,
}

/// A revisioned filesystem over a backing store
pub struct Filesystem {
    store: Arc<dyn NodeStore>,
    txns: TxnTable,
    cache: Option<SyncPageCache<NodeRevision>>,
    /// Serializes the youngest-revision check with recording the new revision.
    commit_lock: Mutex<()>,
}

impl Filesystem {
    /// Open a filesystem over `store`, creating revision 0 if the store is empty.
    pub fn open(store: Arc<dyn NodeStore>, config: &FsConfig) -> Result<Self, FsError> {
        let cache = if config.cache.enabled {
            Some(SyncPageCache::cloning(config.cache.geometry())?)
        } else {
            None
        };

        if store.youngest_revision()?.is_none() {
            let root = store.create_node(&NodeRevision::empty_dir(None))?;
            store.record_revision(0, &root)?;
            info!(root = %root, "Created revision 0");
        }

        Ok(Self {
            store,
            txns: TxnTable::new(),
            cache,
            commit_lock: Mutex::new(()),
        })
    }

    /// Open the backend named by `config.storage`.
    pub fn open_from_config(config: &FsConfig) -> Result<Self, FsError> {
        let store: Arc<dyn NodeStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryNodeStore::new()),
            StorageBackend::Sled => {
                let path = config.storage.path.as_ref().ok_or_else(|| {
                    FsError::ConfigError("storage.path is required for the sled backend".to_string())
                })?;
                Arc::new(SledNodeStore::open(path)?)
            }
        };
        Self::open(store, config)
    }

    /// In-memory filesystem with default settings
    pub fn in_memory() -> Result<Self, FsError> {
        Self::open(Arc::new(MemoryNodeStore::new()), &FsConfig::default())
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub fn youngest_rev(&self) -> Result<Revnum, FsError> {
        self.store.youngest_revision()?.ok_or_else(|| {
            FsError::StorageError(StorageError::Corrupt("store has no revisions".to_string()))
        })
    }

    /// Read-only view of revision `rev`
    pub fn revision_root(&self, rev: Revnum) -> Result<Root<'_>, FsError> {
        let root_id = self.store.revision_root(rev)?;
        Ok(Root {
            fs: self,
            kind: RootKind::Revision(rev),
            root_id,
        })
    }

    /// View of the transaction tree as it is right now
    pub fn txn_root(&self, txn_id: &TxnId) -> Result<Root<'_>, FsError> {
        let root_id = self.with_txn_ref(txn_id, |txn| Ok(txn.root().clone()))?;
        Ok(Root {
            fs: self,
            kind: RootKind::Transaction(txn_id.clone()),
            root_id,
        })
    }

    /// Start a transaction based on revision `base_rev`.
    pub fn begin_txn(&self, base_rev: Revnum) -> Result<TxnId, FsError> {
        let base_root = self.store.revision_root(base_rev)?;
        let id = TxnId::new(self.store.allocate_key(KeyTable::Transactions)?);
        let txn = Transaction::new(id.clone(), base_rev, base_root);
        self.store.put_txn(&txn)?;
        self.txns.insert(txn);
        debug!(txn = %id, base_rev, "Began transaction");
        Ok(id)
    }

    pub fn list_transactions(&self) -> Result<Vec<TxnId>, FsError> {
        Ok(self.store.list_txns()?)
    }

    /// Snapshot of a transaction record
    pub fn transaction(&self, txn_id: &TxnId) -> Result<Transaction, FsError> {
        self.with_txn_ref(txn_id, |txn| Ok(txn.clone()))
    }

    pub fn make_dir(&self, txn_id: &TxnId, path: &str) -> Result<(), FsError> {
        self.make_node(txn_id, path, NodeRevision::empty_dir(Some(txn_id.clone())))
    }

    pub fn make_file(&self, txn_id: &TxnId, path: &str) -> Result<(), FsError> {
        self.make_node(txn_id, path, NodeRevision::empty_file(Some(txn_id.clone())))
    }

    /// Replace the contents of the file at `path`.
    pub fn set_file_contents(
        &self,
        txn_id: &TxnId,
        path: &str,
        contents: &[u8],
    ) -> Result<(), FsError> {
        self.with_txn(txn_id, |txn| {
            let node_path = self.open_path(txn.root(), path)?;
            if self.node_revision(&node_path.id)?.kind() != NodeKind::File {
                return Err(FsError::NotFile(path.to_string()));
            }
            let id = clone_path(self.store.as_ref(), txn, &node_path)?;
            let mut rev = self.store.get_node_revision(&id)?;
            rev.data = NodeData::File {
                contents: contents.to_vec(),
            };
            self.store.put_node_revision(&id, &rev)?;
            Ok(())
        })
    }

    /// Set property `name` on the node at `path`, or delete it when `value` is `None`.
    pub fn change_node_prop(
        &self,
        txn_id: &TxnId,
        path: &str,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), FsError> {
        self.with_txn(txn_id, |txn| {
            let node_path = self.open_path(txn.root(), path)?;
            let id = clone_path(self.store.as_ref(), txn, &node_path)?;
            let mut rev = self.store.get_node_revision(&id)?;
            match value {
                Some(value) => {
                    rev.props.insert(name.to_string(), value.to_string());
                }
                None => {
                    rev.props.remove(name);
                }
            }
            self.store.put_node_revision(&id, &rev)?;
            Ok(())
        })
    }

    /// Remove the entry at `path` from its parent directory.
    pub fn delete(&self, txn_id: &TxnId, path: &str) -> Result<(), FsError> {
        self.with_txn(txn_id, |txn| {
            let node_path = self.open_path(txn.root(), path)?;
            let parent = node_path
                .parent
                .as_deref()
                .ok_or_else(|| FsError::InvalidPath("cannot delete the root".to_string()))?;
            let parent_clone = clone_path(self.store.as_ref(), txn, parent)?;
            self.store
                .change_directory_entry(&parent_clone, &node_path.entry, None)?;
            Ok(())
        })
    }

    /// Move the node at `from` to `to` within the transaction tree.
    ///
    /// The moved node itself is not cloned; it is relinked under the new parent
    /// and remembered as moved, so a later change through either its old or its
    /// new path clones it into the new location.
    pub fn rename(&self, txn_id: &TxnId, from: &str, to: &str) -> Result<(), FsError> {
        let from_parts = components(from).ok_or_else(|| FsError::InvalidPath(from.to_string()))?;
        let to_parts = components(to).ok_or_else(|| FsError::InvalidPath(to.to_string()))?;
        if from_parts.is_empty() || to_parts.is_empty() {
            return Err(FsError::InvalidPath("cannot move the root".to_string()));
        }
        if to_parts.len() >= from_parts.len() && to_parts[..from_parts.len()] == from_parts[..] {
            return Err(FsError::InvalidPath(format!(
                "cannot move {} into itself ({})",
                from, to
            )));
        }

        self.with_txn(txn_id, |txn| {
            let source = self.open_path(txn.root(), from)?;
            let (to_parent_path, to_name) = split_parent(to)?;
            let to_parent = self.open_path(txn.root(), &to_parent_path)?;
            let to_parent_rev = self.node_revision(&to_parent.id)?;
            let entries = to_parent_rev
                .entries()
                .ok_or_else(|| FsError::NotDirectory(to_parent_path.clone()))?;
            if entries.contains_key(&to_name) {
                return Err(FsError::AlreadyExists(to.to_string()));
            }

            let new_parent = clone_path(self.store.as_ref(), txn, &to_parent)?;
            let old_parent = match source.parent.as_deref() {
                Some(parent) => clone_path(self.store.as_ref(), txn, parent)?,
                None => unreachable!("non-empty path resolved to the root"),
            };

            self.store
                .change_directory_entry(&old_parent, &source.entry, None)?;
            self.store
                .change_directory_entry(&new_parent, &to_name, Some(&source.id))?;
            if !txn.is_mutable(&source.id) {
                txn.record_move(source.id.clone(), new_parent, to_name);
            }
            debug!(txn = %txn.id, from, to, node = %source.id, "Moved node");
            Ok(())
        })
    }

    /// Turn the transaction into the next revision.
    ///
    /// Fails with `TxnOutOfDate` if another commit landed after the
    /// transaction's base revision. Once the new revision is recorded the
    /// commit has happened: the transaction is closed at that point, and a
    /// failure to drop its stored record or to flush is only logged.
    pub fn commit_txn(&self, txn_id: &TxnId) -> Result<Revnum, FsError> {
        let handle = self.handle(txn_id)?;
        let mut slot = handle.lock();
        let txn = slot
            .as_ref()
            .ok_or_else(|| StorageError::TxnNotFound(txn_id.clone()))?;

        let _commit = self.commit_lock.lock();
        let youngest = self.youngest_rev()?;
        if txn.base_rev != youngest {
            return Err(FsError::TxnOutOfDate {
                txn: txn_id.clone(),
                base: txn.base_rev,
                youngest,
            });
        }

        for id in txn.mutable_nodes() {
            let mut rev = self.store.get_node_revision(id)?;
            rev.txn_id = None;
            self.store.put_node_revision(id, &rev)?;
        }
        let new_rev = youngest + 1;
        self.store.record_revision(new_rev, txn.root())?;
        *slot = None;

        self.discard_record(txn_id);
        self.txns.remove(txn_id);
        if let Err(e) = self.store.flush() {
            warn!(
                txn = %txn_id,
                revision = new_rev,
                error = %e,
                "Failed to flush after commit"
            );
        }
        info!(txn = %txn_id, revision = new_rev, "Committed transaction");
        Ok(new_rev)
    }

    /// Discard the transaction and every node revision it created.
    ///
    /// A transaction whose tree is already a recorded revision is refused with
    /// `TxnAlreadyCommitted`; its nodes belong to that revision.
    pub fn abort_txn(&self, txn_id: &TxnId) -> Result<(), FsError> {
        let handle = self.handle(txn_id)?;
        let mut slot = handle.lock();
        let txn = slot
            .as_ref()
            .ok_or_else(|| StorageError::TxnNotFound(txn_id.clone()))?;
        let committed = self.committed_as(txn.base_rev, &txn.base_root, txn.root())?;
        if let Some(revision) = committed {
            *slot = None;
            self.discard_record(txn_id);
            self.txns.remove(txn_id);
            return Err(FsError::TxnAlreadyCommitted {
                txn: txn_id.clone(),
                revision,
            });
        }

        for id in txn.mutable_nodes() {
            self.store.delete_node_revision(id)?;
        }
        self.store.delete_txn(txn_id)?;
        *slot = None;
        self.txns.remove(txn_id);
        self.store.flush()?;
        info!(txn = %txn_id, "Aborted transaction");
        Ok(())
    }

    /// Read a node revision, going through the cache for immutable ones.
    pub fn node_revision(&self, id: &NodeID) -> Result<NodeRevision, FsError> {
        let Some(cache) = &self.cache else {
            return Ok(self.store.get_node_revision(id)?);
        };

        let key = blake3::hash(id.as_str().as_bytes());
        if let Some(rev) = cache.get(key.as_bytes())? {
            return Ok(rev);
        }
        let rev = self.store.get_node_revision(id)?;
        if !rev.is_mutable() {
            if let Err(e) = cache.set(key.as_bytes(), &rev) {
                warn!(node = %id, error = %e, "Failed to cache node revision");
            }
        }
        Ok(rev)
    }

    /// Walk `path` from `root`, recording the route.
    pub fn open_path(&self, root: &NodeID, path: &str) -> Result<NodePath, FsError> {
        let parts = components(path).ok_or_else(|| FsError::InvalidPath(path.to_string()))?;
        let mut node_path = NodePath::root(root.clone());
        for part in parts {
            let rev = self.node_revision(&node_path.id)?;
            let entries = rev
                .entries()
                .ok_or_else(|| FsError::NotDirectory(node_path.to_path_string()))?;
            let child = entries
                .get(part)
                .cloned()
                .ok_or_else(|| FsError::NotFound(path.to_string()))?;
            node_path = node_path.child(part, child);
        }
        Ok(node_path)
    }

    fn make_node(&self, txn_id: &TxnId, path: &str, rev: NodeRevision) -> Result<(), FsError> {
        self.with_txn(txn_id, |txn| {
            let (parent_path, name) = split_parent(path)?;
            let parent = self.open_path(txn.root(), &parent_path)?;
            let parent_rev = self.node_revision(&parent.id)?;
            let entries = parent_rev
                .entries()
                .ok_or_else(|| FsError::NotDirectory(parent_path.clone()))?;
            if entries.contains_key(&name) {
                return Err(FsError::AlreadyExists(path.to_string()));
            }

            let parent_clone = clone_path(self.store.as_ref(), txn, &parent)?;
            let id = self.store.create_node(&rev)?;
            txn.record_created(id.clone());
            self.store
                .change_directory_entry(&parent_clone, &name, Some(&id))?;
            debug!(txn = %txn.id, path, node = %id, kind = %rev.kind(), "Created node");
            Ok(())
        })
    }

    /// Runs `load_txn` with the table locked, so it must not use `self.txns`.
    fn handle(&self, txn_id: &TxnId) -> Result<TxnHandle, FsError> {
        self.txns.get_or_load(txn_id, || self.load_txn(txn_id))
    }

    /// Read a stored transaction record, refusing one that no longer describes
    /// an open transaction.
    fn load_txn(&self, txn_id: &TxnId) -> Result<Transaction, FsError> {
        let txn = self.store.get_txn(txn_id)?;
        let (root, base_root) = self.store.get_txn_and_base_roots(txn_id)?;
        if txn.base_root != base_root {
            return Err(StorageError::Corrupt(format!(
                "transaction {} names base root {} but r{} is rooted at {}",
                txn_id, txn.base_root, txn.base_rev, base_root
            ))
            .into());
        }
        if let Some(revision) = self.committed_as(txn.base_rev, &base_root, &root)? {
            // Left behind by a commit that could not delete it.
            self.discard_record(txn_id);
            return Err(FsError::TxnAlreadyCommitted {
                txn: txn_id.clone(),
                revision,
            });
        }
        debug!(txn = %txn_id, base_rev = txn.base_rev, "Loaded transaction");
        Ok(txn)
    }

    /// Revision after `base_rev` whose tree is `root`, if any.
    ///
    /// A transaction that never cloned its root owns no nodes, and an empty
    /// commit records the base root again, so it never matches.
    fn committed_as(
        &self,
        base_rev: Revnum,
        base_root: &NodeID,
        root: &NodeID,
    ) -> Result<Option<Revnum>, FsError> {
        if root == base_root {
            return Ok(None);
        }
        let youngest = self.youngest_rev()?;
        for rev in base_rev + 1..=youngest {
            if self.store.revision_root(rev)? == *root {
                return Ok(Some(rev));
            }
        }
        Ok(None)
    }

    /// Drop the stored record of a transaction that is already closed.
    /// Failure leaves a stale record behind, which `load_txn` recognizes.
    fn discard_record(&self, txn_id: &TxnId) {
        if let Err(e) = self.store.delete_txn(txn_id) {
            warn!(txn = %txn_id, error = %e, "Failed to delete transaction record");
        }
    }

    /// Run `op` with exclusive access to the transaction, then persist the
    /// record. The record is saved even if `op` fails part way, since any
    /// clones it made are already in the store.
    fn with_txn<T>(
        &self,
        txn_id: &TxnId,
        op: impl FnOnce(&mut Transaction) -> Result<T, FsError>,
    ) -> Result<T, FsError> {
        let handle = self.handle(txn_id)?;
        let mut slot = handle.lock();
        let txn = slot
            .as_mut()
            .ok_or_else(|| StorageError::TxnNotFound(txn_id.clone()))?;
        let result = op(txn);
        self.store.put_txn(txn)?;
        result
    }

    fn with_txn_ref<T>(
        &self,
        txn_id: &TxnId,
        op: impl FnOnce(&Transaction) -> Result<T, FsError>,
    ) -> Result<T, FsError> {
        let handle = self.handle(txn_id)?;
        let slot = handle.lock();
        let txn = slot
            .as_ref()
            .ok_or_else(|| StorageError::TxnNotFound(txn_id.clone()))?;
        op(txn)
    }
}

/// Split `path` into its parent path and final component.
fn split_parent(path: &str) -> Result<(String, String), FsError> {
    let parts = components(path).ok_or_else(|| FsError::InvalidPath(path.to_string()))?;
    let (name, parents) = parts
        .split_last()
        .ok_or_else(|| FsError::InvalidPath(format!("{:?} names the root", path)))?;
    Ok((format!("/{}", parents.join("/")), name.to_string()))
}

/// A revision or transaction tree, resolved to its root node when opened
pub struct Root<'a> {
    fs: &'a Filesystem,
    kind: RootKind,
    root_id: NodeID,
}

impl<'a> Root<'a> {
    pub fn kind(&self) -> &RootKind {
        &self.kind
    }

    pub fn root_id(&self) -> &NodeID {
        &self.root_id
    }

    pub fn filesystem(&self) -> &'a Filesystem {
        self.fs
    }

    /// Kind of the node at `path`, or `None` if nothing is there.
    pub fn check_path(&self, path: &str) -> Result<Option<NodeKind>, FsError> {
        match self.node(path) {
            Ok((_, rev)) => Ok(Some(rev.kind())),
            Err(FsError::NotFound(_)) | Err(FsError::NotDirectory(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn node_id(&self, path: &str) -> Result<NodeID, FsError> {
        Ok(self.fs.open_path(&self.root_id, path)?.id)
    }

    pub fn node_kind(&self, path: &str) -> Result<NodeKind, FsError> {
        Ok(self.node(path)?.1.kind())
    }

    pub fn has_properties(&self, path: &str) -> Result<bool, FsError> {
        Ok(!self.node(path)?.1.props.is_empty())
    }

    pub fn node_prop(&self, path: &str, name: &str) -> Result<Option<String>, FsError> {
        Ok(self.node(path)?.1.props.get(name).cloned())
    }

    pub fn node_proplist(&self, path: &str) -> Result<BTreeMap<String, String>, FsError> {
        Ok(self.node(path)?.1.props)
    }

    pub fn file_length(&self, path: &str) -> Result<u64, FsError> {
        let (_, rev) = self.node(path)?;
        rev.contents()
            .map(|contents| contents.len() as u64)
            .ok_or_else(|| FsError::NotFile(path.to_string()))
    }

    pub fn file_contents(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let (_, rev) = self.node(path)?;
        rev.contents()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| FsError::NotFile(path.to_string()))
    }

    /// Entries of the directory at `path`, sorted by name
    pub fn dir_entries(&self, path: &str) -> Result<BTreeMap<String, DirEntry>, FsError> {
        let (_, rev) = self.node(path)?;
        let entries = rev
            .entries()
            .ok_or_else(|| FsError::NotDirectory(path.to_string()))?;

        let mut out = BTreeMap::new();
        for (name, id) in entries {
            let kind = self.fs.node_revision(id)?.kind();
            out.insert(
                name.clone(),
                DirEntry {
                    name: name.clone(),
                    id: id.clone(),
                    kind,
                },
            );
        }
        Ok(out)
    }

    fn node(&self, path: &str) -> Result<(NodeID, NodeRevision), FsError> {
        let id = self.node_id(path)?;
        let rev = self.fs.node_revision(&id)?;
        Ok((id, rev))
    }
}
