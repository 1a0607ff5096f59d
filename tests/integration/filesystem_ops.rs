use revfs::error::StorageError;
use revfs::store::{KeyTable, MemoryNodeStore, NodeStore};
use revfs::tree::{NodeKind, NodeRevision, Transaction};
use revfs::{Filesystem, FsError, NodeID, Revnum, TxnId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Memory store whose flush and transaction deletes can be made to fail
#[derive(Default)]
struct FailingStore {
    inner: MemoryNodeStore,
    fail_flush: AtomicBool,
    fail_delete_txn: AtomicBool,
}

impl FailingStore {
    fn disk_full() -> StorageError {
        StorageError::IoError(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
    }
}

impl NodeStore for FailingStore {
    fn get_node_revision(&self, id: &NodeID) -> Result<NodeRevision, StorageError> {
        self.inner.get_node_revision(id)
    }
    fn put_node_revision(&self, id: &NodeID, rev: &NodeRevision) -> Result<(), StorageError> {
        self.inner.put_node_revision(id, rev)
    }
    fn delete_node_revision(&self, id: &NodeID) -> Result<(), StorageError> {
        self.inner.delete_node_revision(id)
    }
    fn allocate_key(&self, table: KeyTable) -> Result<String, StorageError> {
        self.inner.allocate_key(table)
    }
    fn youngest_revision(&self) -> Result<Option<Revnum>, StorageError> {
        self.inner.youngest_revision()
    }
    fn revision_root(&self, rev: Revnum) -> Result<NodeID, StorageError> {
        self.inner.revision_root(rev)
    }
    fn record_revision(&self, rev: Revnum, root: &NodeID) -> Result<(), StorageError> {
        self.inner.record_revision(rev, root)
    }
    fn get_txn(&self, id: &TxnId) -> Result<Transaction, StorageError> {
        self.inner.get_txn(id)
    }
    fn put_txn(&self, txn: &Transaction) -> Result<(), StorageError> {
        self.inner.put_txn(txn)
    }
    fn delete_txn(&self, id: &TxnId) -> Result<(), StorageError> {
        if self.fail_delete_txn.load(Ordering::SeqCst) {
            return Err(Self::disk_full());
        }
        self.inner.delete_txn(id)
    }
    fn list_txns(&self) -> Result<Vec<TxnId>, StorageError> {
        self.inner.list_txns()
    }
    fn flush(&self) -> Result<(), StorageError> {
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(Self::disk_full());
        }
        self.inner.flush()
    }
}

fn open(store: &Arc<FailingStore>) -> Filesystem {
    Filesystem::open(store.clone(), &Default::default()).unwrap()
}

#[test]
fn out_of_date_transaction_cannot_commit() {
    let fs = Filesystem::in_memory().unwrap();
    let early = fs.begin_txn(0).unwrap();
    let late = fs.begin_txn(0).unwrap();

    fs.make_file(&late, "/late").unwrap();
    assert_eq!(fs.commit_txn(&late).unwrap(), 1);

    fs.make_file(&early, "/early").unwrap();
    match fs.commit_txn(&early) {
        Err(FsError::TxnOutOfDate {
            txn,
            base,
            youngest,
        }) => {
            assert_eq!(txn, early);
            assert_eq!(base, 0);
            assert_eq!(youngest, 1);
        }
        other => panic!("expected TxnOutOfDate, got {:?}", other.map(|_| ())),
    }

    // The failed transaction is still open and can be aborted.
    assert_eq!(fs.list_transactions().unwrap(), vec![early.clone()]);
    fs.abort_txn(&early).unwrap();
    assert!(fs.list_transactions().unwrap().is_empty());
    assert_eq!(fs.youngest_rev().unwrap(), 1);
}

#[test]
fn abort_deletes_every_node_the_transaction_made() {
    let fs = Filesystem::in_memory().unwrap();
    let txn = fs.begin_txn(0).unwrap();
    fs.make_dir(&txn, "/d").unwrap();
    fs.make_file(&txn, "/d/f").unwrap();
    fs.set_file_contents(&txn, "/d/f", b"scratch").unwrap();

    let made: Vec<NodeID> = fs
        .transaction(&txn)
        .unwrap()
        .mutable_nodes()
        .cloned()
        .collect();
    assert_eq!(made.len(), 3);

    fs.abort_txn(&txn).unwrap();
    for id in &made {
        assert!(matches!(
            fs.store().get_node_revision(id),
            Err(StorageError::NodeNotFound(_))
        ));
    }
    // Revision 0 is intact.
    let root = fs.revision_root(0).unwrap();
    assert!(root.dir_entries("/").unwrap().is_empty());
    assert!(matches!(
        fs.abort_txn(&txn),
        Err(FsError::StorageError(StorageError::TxnNotFound(_)))
    ));
}

#[test]
fn properties_follow_the_node() {
    let fs = Filesystem::in_memory().unwrap();
    let txn = fs.begin_txn(0).unwrap();
    fs.make_file(&txn, "/f").unwrap();
    fs.change_node_prop(&txn, "/f", "a", Some("1")).unwrap();
    fs.change_node_prop(&txn, "/f", "b", Some("2")).unwrap();
    fs.commit_txn(&txn).unwrap();

    let txn = fs.begin_txn(1).unwrap();
    fs.change_node_prop(&txn, "/f", "a", None).unwrap();
    fs.rename(&txn, "/f", "/g").unwrap();
    fs.commit_txn(&txn).unwrap();

    let r1 = fs.revision_root(1).unwrap();
    let r2 = fs.revision_root(2).unwrap();
    assert_eq!(r1.node_proplist("/f").unwrap().len(), 2);
    let props = r2.node_proplist("/g").unwrap();
    assert_eq!(props.get("b").map(String::as_str), Some("2"));
    assert_eq!(props.get("a"), None);
}

#[test]
fn revision_roots_are_stable_across_commits() {
    let fs = Filesystem::in_memory().unwrap();
    for i in 0..5u64 {
        let txn = fs.begin_txn(i).unwrap();
        fs.make_file(&txn, &format!("/file{}", i)).unwrap();
        assert_eq!(fs.commit_txn(&txn).unwrap(), i + 1);
    }

    for rev in 0..=5u64 {
        let root = fs.revision_root(rev).unwrap();
        let entries = root.dir_entries("/").unwrap();
        assert_eq!(entries.len() as u64, rev);
        assert!(entries.values().all(|e| e.kind == NodeKind::File));
    }
    assert!(matches!(
        fs.revision_root(6),
        Err(FsError::StorageError(StorageError::NoSuchRevision(6)))
    ));
}

#[test]
fn concurrent_writers_on_separate_transactions() {
    let fs = Arc::new(Filesystem::in_memory().unwrap());
    let txns: Vec<_> = (0..4).map(|_| fs.begin_txn(0).unwrap()).collect();

    let handles: Vec<_> = txns
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, txn)| {
            let fs = fs.clone();
            thread::spawn(move || {
                fs.make_dir(&txn, &format!("/d{}", i)).unwrap();
                for j in 0..10 {
                    let path = format!("/d{}/f{}", i, j);
                    fs.make_file(&txn, &path).unwrap();
                    fs.set_file_contents(&txn, &path, path.as_bytes()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for (i, txn) in txns.iter().enumerate() {
        let root = fs.txn_root(txn).unwrap();
        assert_eq!(root.dir_entries("/").unwrap().len(), 1);
        assert_eq!(root.dir_entries(&format!("/d{}", i)).unwrap().len(), 10);
    }

    // Only the first commit is current; the rest are out of date.
    assert_eq!(fs.commit_txn(&txns[0]).unwrap(), 1);
    for txn in &txns[1..] {
        assert!(matches!(
            fs.commit_txn(txn),
            Err(FsError::TxnOutOfDate { .. })
        ));
    }
}

#[test]
fn concurrent_writers_on_one_transaction() {
    let fs = Arc::new(Filesystem::in_memory().unwrap());
    let txn = fs.begin_txn(0).unwrap();
    fs.make_dir(&txn, "/shared").unwrap();
    fs.commit_txn(&txn).unwrap();

    let txn = fs.begin_txn(1).unwrap();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let fs = fs.clone();
            let txn = txn.clone();
            thread::spawn(move || {
                fs.make_file(&txn, &format!("/shared/f{}", i)).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let record = fs.transaction(&txn).unwrap();
    // root and /shared cloned once each, plus eight new files
    assert_eq!(record.mutable_nodes().count(), 10);
    assert_eq!(record.clone_count(), 1);
    assert_eq!(
        fs.txn_root(&txn).unwrap().dir_entries("/shared").unwrap().len(),
        8
    );
}

#[test]
fn failed_flush_after_commit_keeps_the_revision() {
    let store = Arc::new(FailingStore::default());
    let fs = open(&store);
    let txn = fs.begin_txn(0).unwrap();
    fs.make_dir(&txn, "/a").unwrap();
    fs.make_file(&txn, "/a/f").unwrap();

    store.fail_flush.store(true, Ordering::SeqCst);
    assert_eq!(fs.commit_txn(&txn).unwrap(), 1);

    // The transaction is closed, so the caller's cleanup abort is a no-op.
    assert!(matches!(
        fs.abort_txn(&txn),
        Err(FsError::StorageError(StorageError::TxnNotFound(_)))
    ));
    let r1 = fs.revision_root(1).unwrap();
    assert_eq!(r1.node_kind("/a").unwrap(), NodeKind::Directory);
    assert_eq!(r1.node_kind("/a/f").unwrap(), NodeKind::File);
    assert!(fs.list_transactions().unwrap().is_empty());
}

#[test]
fn stale_record_of_committed_transaction_cannot_be_aborted() {
    let store = Arc::new(FailingStore::default());
    let txn = {
        let fs = open(&store);
        let txn = fs.begin_txn(0).unwrap();
        fs.make_dir(&txn, "/a").unwrap();
        store.fail_delete_txn.store(true, Ordering::SeqCst);
        assert_eq!(fs.commit_txn(&txn).unwrap(), 1);
        txn
    };
    store.fail_delete_txn.store(false, Ordering::SeqCst);
    assert_eq!(store.list_txns().unwrap(), vec![txn.clone()]);

    let fs = open(&store);
    match fs.abort_txn(&txn) {
        Err(FsError::TxnAlreadyCommitted { txn: id, revision }) => {
            assert_eq!(id, txn);
            assert_eq!(revision, 1);
        }
        other => panic!("expected TxnAlreadyCommitted, got {:?}", other),
    }
    // The stale record is dropped and r1 keeps its nodes.
    assert!(fs.list_transactions().unwrap().is_empty());
    let r1 = fs.revision_root(1).unwrap();
    assert_eq!(r1.node_kind("/a").unwrap(), NodeKind::Directory);
    assert!(matches!(
        fs.make_file(&txn, "/a/late"),
        Err(FsError::StorageError(StorageError::TxnNotFound(_)))
    ));
}

#[test]
fn loaded_transaction_with_wrong_base_root_is_rejected() {
    let store = Arc::new(FailingStore::default());
    let fs = open(&store);
    let first = fs.begin_txn(0).unwrap();
    fs.make_file(&first, "/f").unwrap();
    fs.commit_txn(&first).unwrap();

    // A record claiming base r0 while naming r1's root as its base.
    let bogus = Transaction::new(
        TxnId::new("zz"),
        0,
        fs.revision_root(1).unwrap().root_id().clone(),
    );
    store.put_txn(&bogus).unwrap();

    assert!(matches!(
        fs.transaction(&bogus.id),
        Err(FsError::StorageError(StorageError::Corrupt(_)))
    ));
}

#[test]
fn closed_transaction_is_not_reloaded_by_racing_writers() {
    let store = Arc::new(FailingStore::default());
    let txn = {
        let fs = open(&store);
        let txn = fs.begin_txn(0).unwrap();
        fs.make_dir(&txn, "/d").unwrap();
        txn
    };

    // A fresh filesystem has to load the transaction from the store.
    let fs = Arc::new(open(&store));
    let writers: Vec<_> = (0..4)
        .map(|i| {
            let fs = fs.clone();
            let txn = txn.clone();
            thread::spawn(move || {
                for j in 0.. {
                    if fs.make_file(&txn, &format!("/d/f{}-{}", i, j)).is_err() {
                        break;
                    }
                }
            })
        })
        .collect();
    let rev = fs.commit_txn(&txn).unwrap();
    for writer in writers {
        writer.join().unwrap();
    }

    assert!(matches!(
        store.get_txn(&txn),
        Err(StorageError::TxnNotFound(_))
    ));
    assert!(fs.list_transactions().unwrap().is_empty());
    assert!(fs.revision_root(rev).unwrap().check_path("/d").unwrap().is_some());
}
