//! revfs: Revisioned Filesystem Storage
//!
//! A transactional, revisioned tree of immutable node revisions. Transactions
//! clone only the nodes they change and share everything else with their base
//! revision. Supporting pieces: ordered base-36 key generation, a paged LRU
//! cache for hot node revisions, and a one-time initializer for global state.

pub mod atomic;
pub mod cache;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod fs;
pub mod key_gen;
pub mod logging;
pub mod store;
pub mod tooling;
pub mod tree;
pub mod types;

pub use error::FsError;
pub use fs::{DirEntry, Filesystem, Root, RootKind};
pub use types::{NodeID, Revnum, TxnId};
