use revfs::tree::{NodeHandle, NodeKind, RevisionNode, TxnNode};
use revfs::Filesystem;

fn collect(handle: &dyn NodeHandle, out: &mut Vec<String>) {
    let line = match handle.kind() {
        NodeKind::File => format!("{} {}", handle.path(), handle.file_length().unwrap()),
        NodeKind::Directory => format!("{}/", handle.path()),
    };
    out.push(line);
    if handle.kind() == NodeKind::Directory {
        for child in handle.directory_entries().unwrap().values() {
            collect(child.as_ref(), out);
        }
    }
}

#[test]
fn handles_traverse_the_same_tree_from_either_root() {
    let fs = Filesystem::in_memory().unwrap();
    let txn = fs.begin_txn(0).unwrap();
    fs.make_dir(&txn, "/src").unwrap();
    fs.make_dir(&txn, "/src/bin").unwrap();
    fs.make_file(&txn, "/src/bin/main").unwrap();
    fs.set_file_contents(&txn, "/src/bin/main", b"fn main() {}").unwrap();
    fs.make_file(&txn, "/Cargo").unwrap();

    // Before commit, the transaction is the only place the tree exists.
    let mut staged = Vec::new();
    collect(&TxnNode::open(&fs, &txn, "/").unwrap(), &mut staged);
    let rev = fs.commit_txn(&txn).unwrap();

    let mut committed = Vec::new();
    collect(&RevisionNode::open(&fs, rev, "/").unwrap(), &mut committed);
    assert_eq!(staged, committed);
    assert_eq!(
        committed,
        vec!["//", "/Cargo 0", "/src/", "/src/bin/", "/src/bin/main 12"]
    );
}

#[test]
fn revision_handle_ignores_later_transactions() {
    let fs = Filesystem::in_memory().unwrap();
    let txn = fs.begin_txn(0).unwrap();
    fs.make_dir(&txn, "/d").unwrap();
    fs.commit_txn(&txn).unwrap();

    let fixed = RevisionNode::open(&fs, 1, "/d").unwrap();
    let txn = fs.begin_txn(1).unwrap();
    let live = TxnNode::open(&fs, &txn, "/d").unwrap();
    fs.make_file(&txn, "/d/new").unwrap();

    assert!(fixed.directory_entries().unwrap().is_empty());
    let entries = live.directory_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries["new"].kind(), NodeKind::File);
    assert_eq!(entries["new"].path(), "/d/new");
}

#[test]
fn handle_of_closed_transaction_fails() {
    let fs = Filesystem::in_memory().unwrap();
    let txn = fs.begin_txn(0).unwrap();
    fs.make_file(&txn, "/f").unwrap();
    let handle = TxnNode::open(&fs, &txn, "/f").unwrap();
    fs.abort_txn(&txn).unwrap();

    assert_eq!(handle.kind(), NodeKind::File);
    assert!(handle.has_properties().is_err());
}
