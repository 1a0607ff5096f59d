//! Versioned Tree
//!
//! Copy-on-write node revisions shared between revisions, with transactions
//! cloning only what they change.

pub mod clone;
pub mod compat;
pub mod node;
pub mod path;
pub mod txn;

pub use clone::clone_path;
pub use compat::{NodeHandle, RevisionNode, TxnNode};
pub use node::{NodeData, NodeKind, NodeRevision};
pub use path::NodePath;
pub use txn::{CloneState, Transaction};
