//! Integration tests for the revisioned filesystem

mod clone_behavior;
mod concurrent_init;
mod filesystem_ops;
mod node_compat;
mod sled_store;
