//! CLI Tooling
//!
//! Every mutating command runs in its own transaction based on the youngest
//! revision and commits it before returning. A failed command aborts its
//! transaction.

use crate::config::{ConfigLoader, FsConfig, StorageBackend};
use crate::error::FsError;
use crate::fs::Filesystem;
use crate::key_gen;
use crate::logging::{init_logging, LoggingConfig};
use crate::tree::node::NodeKind;
use crate::types::{Revnum, TxnId};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use serde_json::json;
use std::io::Read;
use std::path::PathBuf;
use tracing::{info, warn};

/// revfs CLI - Revisioned copy-on-write filesystem
#[derive(Parser)]
#[command(name = "revfs")]
#[command(about = "Inspect and change a revisioned filesystem repository")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Repository directory (overrides storage.path from config)
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, default_value = "text")]
    pub format: String,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line logging flags on top of the configured settings.
    pub fn logging_config(&self, base: &LoggingConfig) -> LoggingConfig {
        let mut config = base.clone();
        if self.verbose {
            config.level = "debug".to_string();
        }
        if let Some(level) = &self.log_level {
            config.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            config.file = Some(file.clone());
        }
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the repository (revision 0) if it does not exist
    Init,
    /// Print the youngest revision number
    Youngest,
    /// List a directory
    Ls {
        /// Directory path
        #[arg(default_value = "/")]
        path: String,
        /// Revision to read (default: youngest)
        #[arg(short, long)]
        revision: Option<Revnum>,
    },
    /// Print the contents of a file
    Cat {
        path: String,
        /// Revision to read (default: youngest)
        #[arg(short, long)]
        revision: Option<Revnum>,
    },
    /// Create a directory
    Mkdir { path: String },
    /// Create or replace a file
    Put {
        path: String,
        /// Read contents from this file
        #[arg(long, conflicts_with = "text")]
        from: Option<PathBuf>,
        /// Use this text as the contents
        #[arg(long)]
        text: Option<String>,
    },
    /// Remove a file or directory
    Rm { path: String },
    /// Move a file or directory
    Mv { from: String, to: String },
    /// Set a property, or delete it with --delete
    Propset {
        path: String,
        name: String,
        value: Option<String>,
        #[arg(long, conflicts_with = "value")]
        delete: bool,
    },
    /// List open transactions
    Txns,
    /// Print the key that follows KEY
    NextKey { key: String },
}

/// CLI context holding the open filesystem
pub struct CliContext {
    fs: Filesystem,
    config: FsConfig,
    format: String,
}

impl CliContext {
    /// Load configuration, install logging and open the repository.
    pub fn new(cli: &Cli) -> Result<Self, FsError> {
        let mut config = match &cli.config {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };

        if let Err(e) = init_logging(Some(&cli.logging_config(&config.logging))) {
            eprintln!("Warning: logging disabled: {}", e);
        }

        if let Some(repo) = &cli.repo {
            config.storage.backend = StorageBackend::Sled;
            config.storage.path = Some(repo.clone());
        }
        if config.storage.backend == StorageBackend::Sled && config.storage.path.is_none() {
            return Err(FsError::ConfigError(
                "no repository given (use --repo or set storage.path)".to_string(),
            ));
        }

        let fs = Filesystem::open_from_config(&config)?;
        Ok(Self {
            fs,
            config,
            format: cli.format.clone(),
        })
    }

    pub fn filesystem(&self) -> &Filesystem {
        &self.fs
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, FsError> {
        if self.format != "text" && self.format != "json" {
            return Err(FsError::ConfigError(format!(
                "Invalid output format: {} (must be 'text' or 'json')",
                self.format
            )));
        }

        match command {
            Commands::Init => {
                let youngest = self.fs.youngest_rev()?;
                self.render(
                    json!({ "youngest": youngest }),
                    format!("Repository ready at revision {}", youngest),
                )
            }
            Commands::Youngest => {
                let youngest = self.fs.youngest_rev()?;
                self.render(json!({ "youngest": youngest }), youngest.to_string())
            }
            Commands::Ls { path, revision } => self.handle_ls(path, *revision),
            Commands::Cat { path, revision } => self.handle_cat(path, *revision),
            Commands::Mkdir { path } => {
                let rev = self.commit_change(|txn| self.fs.make_dir(txn, path))?;
                self.committed(rev)
            }
            Commands::Put { path, from, text } => {
                let contents = read_contents(from.as_ref(), text.as_deref())?;
                let rev = self.commit_change(|txn| {
                    if self.fs.txn_root(txn)?.check_path(path)?.is_none() {
                        self.fs.make_file(txn, path)?;
                    }
                    self.fs.set_file_contents(txn, path, &contents)
                })?;
                self.committed(rev)
            }
            Commands::Rm { path } => {
                let rev = self.commit_change(|txn| self.fs.delete(txn, path))?;
                self.committed(rev)
            }
            Commands::Mv { from, to } => {
                let rev = self.commit_change(|txn| self.fs.rename(txn, from, to))?;
                self.committed(rev)
            }
            Commands::Propset {
                path,
                name,
                value,
                delete,
            } => {
                let value = match (value, delete) {
                    (_, true) => None,
                    (Some(value), false) => Some(value.as_str()),
                    (None, false) => {
                        return Err(FsError::InvalidPath(
                            "propset needs a value or --delete".to_string(),
                        ))
                    }
                };
                let rev = self.commit_change(|txn| self.fs.change_node_prop(txn, path, name, value))?;
                self.committed(rev)
            }
            Commands::Txns => self.handle_txns(),
            Commands::NextKey { key } => {
                let next = key_gen::next_key(key)?;
                self.render(json!({ "key": key, "next": next }), next.clone())
            }
        }
    }

    /// Run `op` in a fresh transaction on the youngest revision and commit it.
    fn commit_change<F>(&self, op: F) -> Result<Revnum, FsError>
    where
        F: FnOnce(&TxnId) -> Result<(), FsError>,
    {
        let base = self.fs.youngest_rev()?;
        let txn = self.fs.begin_txn(base)?;
        let result = op(&txn).and_then(|()| self.fs.commit_txn(&txn));
        if result.is_err() {
            if let Err(e) = self.fs.abort_txn(&txn) {
                warn!(txn = %txn, error = %e, "Failed to abort transaction");
            }
        }
        let rev = result?;
        info!(revision = rev, "Committed change");
        Ok(rev)
    }

    fn committed(&self, rev: Revnum) -> Result<String, FsError> {
        self.render(
            json!({ "committed": rev }),
            format!("Committed revision {}.", rev),
        )
    }

    fn handle_ls(&self, path: &str, revision: Option<Revnum>) -> Result<String, FsError> {
        let rev = match revision {
            Some(rev) => rev,
            None => self.fs.youngest_rev()?,
        };
        let root = self.fs.revision_root(rev)?;
        let entries = root.dir_entries(path)?;

        let mut rows = Vec::with_capacity(entries.len());
        for (name, entry) in &entries {
            let size = match entry.kind {
                NodeKind::File => {
                    let child = if path.ends_with('/') {
                        format!("{}{}", path, name)
                    } else {
                        format!("{}/{}", path, name)
                    };
                    Some(root.file_length(&child)?)
                }
                NodeKind::Directory => None,
            };
            rows.push((entry, size));
        }

        if self.format == "json" {
            let arr: Vec<serde_json::Value> = rows
                .iter()
                .map(|(entry, size)| {
                    json!({
                        "name": entry.name,
                        "kind": entry.kind.to_string(),
                        "node_id": entry.id,
                        "size": size,
                    })
                })
                .collect();
            return to_json(&json!({ "revision": rev, "path": path, "entries": arr }));
        }

        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Name", "Kind", "Node ID", "Size"]);
        for (entry, size) in &rows {
            let size = size.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
            table.add_row(vec![
                entry.name.clone(),
                entry.kind.to_string(),
                entry.id.to_string(),
                size,
            ]);
        }
        Ok(table.to_string())
    }

    fn handle_cat(&self, path: &str, revision: Option<Revnum>) -> Result<String, FsError> {
        let rev = match revision {
            Some(rev) => rev,
            None => self.fs.youngest_rev()?,
        };
        let contents = self.fs.revision_root(rev)?.file_contents(path)?;
        let text = String::from_utf8_lossy(&contents).into_owned();
        self.render(
            json!({
                "revision": rev,
                "path": path,
                "length": contents.len(),
                "contents": text,
            }),
            text.clone(),
        )
    }

    fn handle_txns(&self) -> Result<String, FsError> {
        let mut txns = Vec::new();
        for id in self.fs.list_transactions()? {
            txns.push(self.fs.transaction(&id)?);
        }

        if self.format == "json" {
            let arr: Vec<serde_json::Value> = txns
                .iter()
                .map(|txn| {
                    json!({
                        "id": txn.id,
                        "base_rev": txn.base_rev,
                        "created_at": txn.created_at.to_rfc3339(),
                        "clones": txn.clone_count(),
                    })
                })
                .collect();
            return to_json(&serde_json::Value::Array(arr));
        }

        if txns.is_empty() {
            return Ok("No open transactions.".to_string());
        }
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["ID", "Base", "Created", "Clones"]);
        for txn in &txns {
            table.add_row(vec![
                txn.id.to_string(),
                txn.base_rev.to_string(),
                txn.created_at.to_rfc3339(),
                txn.clone_count().to_string(),
            ]);
        }
        Ok(table.to_string())
    }

    fn render(&self, value: serde_json::Value, text: String) -> Result<String, FsError> {
        if self.format == "json" {
            to_json(&value)
        } else {
            Ok(text)
        }
    }
}

fn to_json(value: &serde_json::Value) -> Result<String, FsError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| FsError::ConfigError(format!("Failed to encode output: {}", e)))
}

/// Contents for `put`: `--text`, else `--from`, else standard input.
fn read_contents(from: Option<&PathBuf>, text: Option<&str>) -> Result<Vec<u8>, FsError> {
    if let Some(text) = text {
        return Ok(text.as_bytes().to_vec());
    }
    let io_err = |e: std::io::Error| FsError::StorageError(e.into());
    match from {
        Some(path) => std::fs::read(path).map_err(io_err),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf).map_err(io_err)?;
            Ok(buf)
        }
    }
}
