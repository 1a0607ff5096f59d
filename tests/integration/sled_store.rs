use revfs::config::{FsConfig, StorageBackend};
use revfs::store::{NodeStore, SledNodeStore};
use revfs::tree::NodeKind;
use revfs::Filesystem;
use std::sync::Arc;
use tempfile::TempDir;

fn sled_config(temp: &TempDir) -> FsConfig {
    let mut config = FsConfig::default();
    config.storage.backend = StorageBackend::Sled;
    config.storage.path = Some(temp.path().join("repo"));
    config
}

#[test]
fn reopened_repository_keeps_revisions_and_tree() {
    let temp = TempDir::new().unwrap();
    let config = sled_config(&temp);

    let (root_r1, readme) = {
        let fs = Filesystem::open_from_config(&config).unwrap();
        let txn = fs.begin_txn(0).unwrap();
        fs.make_dir(&txn, "/trunk").unwrap();
        fs.make_file(&txn, "/trunk/README").unwrap();
        fs.set_file_contents(&txn, "/trunk/README", b"persisted").unwrap();
        assert_eq!(fs.commit_txn(&txn).unwrap(), 1);

        let root = fs.revision_root(1).unwrap();
        (root.root_id().clone(), root.node_id("/trunk/README").unwrap())
    };

    let fs = Filesystem::open_from_config(&config).unwrap();
    assert_eq!(fs.youngest_rev().unwrap(), 1);
    let root = fs.revision_root(1).unwrap();
    assert_eq!(root.root_id(), &root_r1);
    assert_eq!(root.node_id("/trunk/README").unwrap(), readme);
    assert_eq!(root.file_contents("/trunk/README").unwrap(), b"persisted");
    assert_eq!(root.node_kind("/trunk").unwrap(), NodeKind::Directory);
}

#[test]
fn open_transaction_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let config = sled_config(&temp);

    let txn = {
        let fs = Filesystem::open_from_config(&config).unwrap();
        let txn = fs.begin_txn(0).unwrap();
        fs.make_dir(&txn, "/pending").unwrap();
        fs.store().flush().unwrap();
        txn
    };

    let fs = Filesystem::open_from_config(&config).unwrap();
    assert_eq!(fs.list_transactions().unwrap(), vec![txn.clone()]);
    // The reloaded clones table keeps later changes in the same clones.
    let root_before = fs.txn_root(&txn).unwrap().root_id().clone();
    fs.make_file(&txn, "/pending/file").unwrap();
    assert_eq!(fs.txn_root(&txn).unwrap().root_id(), &root_before);

    assert_eq!(fs.commit_txn(&txn).unwrap(), 1);
    let root = fs.revision_root(1).unwrap();
    assert_eq!(root.check_path("/pending/file").unwrap(), Some(NodeKind::File));
    assert!(fs.list_transactions().unwrap().is_empty());
}

#[test]
fn sled_keys_continue_after_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("repo");

    let first = {
        let store: Arc<dyn NodeStore> = Arc::new(SledNodeStore::open(&path).unwrap());
        let fs = Filesystem::open(store, &FsConfig::default()).unwrap();
        let txn = fs.begin_txn(0).unwrap();
        fs.abort_txn(&txn).unwrap();
        txn
    };

    let store: Arc<dyn NodeStore> = Arc::new(SledNodeStore::open(&path).unwrap());
    let fs = Filesystem::open(store, &FsConfig::default()).unwrap();
    let second = fs.begin_txn(0).unwrap();
    assert_ne!(first, second);
    assert_eq!(first.as_str(), "0");
    assert_eq!(second.as_str(), "1");
}

#[test]
fn missing_path_for_sled_backend_is_a_config_error() {
    let config = FsConfig::default();
    assert!(matches!(
        Filesystem::open_from_config(&config),
        Err(revfs::FsError::ConfigError(_))
    ));
}
