//! Core types for the revisioned filesystem.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Revision number. Revision 0 is the empty tree created with the filesystem.
pub type Revnum = u64;

/// NodeID: identifier of one node revision, allocated from the `nodes` key table.
///
/// Ids are never reused. Once the owning transaction commits, the node revision
/// an id names is immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeID(String);

impl NodeID {
    pub fn new(key: impl Into<String>) -> Self {
        NodeID(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// TxnId: identifier of a transaction, allocated from the `transactions` key table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxnId(String);

impl TxnId {
    pub fn new(key: impl Into<String>) -> Self {
        TxnId(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
