//! Error types for the revisioned filesystem.
//!
//! Each layer has its own error enum; `FsError` is the umbrella returned by the
//! filesystem facade and the CLI.

use crate::types::{NodeID, Revnum, TxnId};
use thiserror::Error;

/// Key generation and parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),
}

/// One-time initialization errors
///
/// Cloneable so a failed initialization can be replayed to every later caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("Initialization failed: {0}")]
    Failed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<crate::atomic::InitPanicked> for InitError {
    fn from(_: crate::atomic::InitPanicked) -> Self {
        InitError::Failed(crate::atomic::InitPanicked::MESSAGE.to_string())
    }
}

/// Page cache errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache key has length {actual}, expected {expected}")]
    KeyLength { expected: usize, actual: usize },

    #[error("Invalid cache geometry: {0}")]
    InvalidGeometry(String),

    #[error("Failed to duplicate cached value: {0}")]
    Duplicate(String),
}

/// Backing store errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Node revision not found: {0}")]
    NodeNotFound(NodeID),

    #[error("Transaction not found: {0}")]
    TxnNotFound(TxnId),

    #[error("No such revision: {0}")]
    NoSuchRevision(Revnum),

    #[error("Node revision {0} is not a directory")]
    NotADirectory(NodeID),

    #[error("Corrupt store: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Filesystem-level errors
#[derive(Error, Debug)]
pub enum FsError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Init(#[from] InitError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotDirectory(String),

    #[error("Not a file: {0}")]
    NotFile(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Transaction {txn} is based on r{base} but the youngest revision is r{youngest}")]
    TxnOutOfDate {
        txn: TxnId,
        base: Revnum,
        youngest: Revnum,
    },

    #[error("Node {node} was moved under {parent}, which is not mutable in this transaction")]
    UnsupportedMoveChain { node: NodeID, parent: NodeID },

    #[error("Transaction {txn} was already committed as r{revision}")]
    TxnAlreadyCommitted { txn: TxnId, revision: Revnum },
}

impl From<config::ConfigError> for FsError {
    fn from(err: config::ConfigError) -> Self {
        FsError::ConfigError(err.to_string())
    }
}
