use revfs::store::{MemoryNodeStore, NodeStore};
use revfs::{Filesystem, NodeID};
use std::collections::BTreeSet;
use std::sync::Arc;

fn fixture() -> (Arc<MemoryNodeStore>, Filesystem) {
    let store = Arc::new(MemoryNodeStore::new());
    let fs = Filesystem::open(store.clone(), &Default::default()).unwrap();

    let txn = fs.begin_txn(0).unwrap();
    for dir in ["/a", "/a/b", "/a/b/c", "/x"] {
        fs.make_dir(&txn, dir).unwrap();
    }
    fs.make_file(&txn, "/a/b/c/leaf").unwrap();
    fs.make_file(&txn, "/x/other").unwrap();
    fs.commit_txn(&txn).unwrap();
    (store, fs)
}

#[test]
fn deep_change_clones_each_ancestor_once() {
    let (store, fs) = fixture();
    let before = store.node_count();

    let txn = fs.begin_txn(1).unwrap();
    fs.set_file_contents(&txn, "/a/b/c/leaf", b"one").unwrap();
    // root, a, b, c, leaf
    assert_eq!(store.node_count(), before + 5);

    fs.set_file_contents(&txn, "/a/b/c/leaf", b"two").unwrap();
    fs.change_node_prop(&txn, "/a/b", "owner", Some("me")).unwrap();
    assert_eq!(store.node_count(), before + 5);

    let record = fs.transaction(&txn).unwrap();
    assert_eq!(record.mutable_nodes().count(), 5);
    assert_eq!(record.clone_count(), 4);
}

#[test]
fn untouched_subtrees_are_shared_with_base() {
    let (_store, fs) = fixture();
    let txn = fs.begin_txn(1).unwrap();
    fs.set_file_contents(&txn, "/a/b/c/leaf", b"new").unwrap();
    fs.commit_txn(&txn).unwrap();

    let r1 = fs.revision_root(1).unwrap();
    let r2 = fs.revision_root(2).unwrap();
    assert_eq!(r1.node_id("/x").unwrap(), r2.node_id("/x").unwrap());
    assert_eq!(r1.node_id("/x/other").unwrap(), r2.node_id("/x/other").unwrap());
    for path in ["/", "/a", "/a/b", "/a/b/c", "/a/b/c/leaf"] {
        assert_ne!(r1.node_id(path).unwrap(), r2.node_id(path).unwrap(), "{}", path);
    }
    assert_eq!(r1.file_length("/a/b/c/leaf").unwrap(), 0);
    assert_eq!(r2.file_contents("/a/b/c/leaf").unwrap(), b"new");
}

#[test]
fn clones_record_their_predecessors() {
    let (store, fs) = fixture();
    let base = fs.revision_root(1).unwrap();
    let old_b = base.node_id("/a/b").unwrap();

    let txn = fs.begin_txn(1).unwrap();
    fs.change_node_prop(&txn, "/a/b", "k", Some("v")).unwrap();
    let new_b = fs.txn_root(&txn).unwrap().node_id("/a/b").unwrap();

    let rev = store.get_node_revision(&new_b).unwrap();
    assert_eq!(rev.predecessor, Some(old_b.clone()));
    assert_eq!(rev.txn_id, Some(txn.clone()));
    assert!(store.get_node_revision(&old_b).unwrap().props.is_empty());
}

#[test]
fn rename_then_modify_through_new_path() {
    let (store, fs) = fixture();
    let moved: NodeID = fs.revision_root(1).unwrap().node_id("/a/b/c").unwrap();

    let txn = fs.begin_txn(1).unwrap();
    fs.rename(&txn, "/a/b/c", "/x/c").unwrap();
    let after_move = store.node_count();

    fs.set_file_contents(&txn, "/x/c/leaf", b"moved").unwrap();
    // The moved directory and its leaf are cloned; /x was already cloned by the move.
    assert_eq!(store.node_count(), after_move + 2);

    let root = fs.txn_root(&txn).unwrap();
    let c_clone = root.node_id("/x/c").unwrap();
    assert_ne!(c_clone, moved);
    assert_eq!(
        store.get_node_revision(&c_clone).unwrap().predecessor,
        Some(moved)
    );
    assert_eq!(root.check_path("/a/b/c").unwrap(), None);

    fs.commit_txn(&txn).unwrap();
    let r2 = fs.revision_root(2).unwrap();
    assert_eq!(r2.file_contents("/x/c/leaf").unwrap(), b"moved");
    assert_eq!(r2.check_path("/a/b/c").unwrap(), None);
}

#[test]
fn commit_leaves_no_mutable_nodes() {
    let (store, fs) = fixture();
    let txn = fs.begin_txn(1).unwrap();
    fs.make_file(&txn, "/x/new").unwrap();
    let touched: BTreeSet<NodeID> = fs
        .transaction(&txn)
        .unwrap()
        .mutable_nodes()
        .cloned()
        .collect();
    fs.commit_txn(&txn).unwrap();

    for id in touched {
        assert!(!store.get_node_revision(&id).unwrap().is_mutable());
    }
}
