//! Tooling
//!
//! Command-line access to a sled-backed repository.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
