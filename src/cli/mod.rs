//! CLI argument parsing for confsync.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Confsync: file-based configuration synchronization with dependency-aware
/// staged imports.
///
/// A project keeps two config storages side by side:
/// - the active storage the system runs on
/// - the staged/sync storage being deployed
///
/// `diff` computes an ordered changelist between them; `import` validates
/// it against the dependency graph and applies it entry by entry.
#[derive(Parser, Debug)]
#[command(name = "confsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Output format for the diff command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable one-line-per-entry output.
    #[default]
    Text,
    /// The changelist export format as JSON.
    Json,
}

/// Available commands for confsync.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a confsync project in the current directory.
    ///
    /// Creates confsync.yaml, the active and sync storage directories,
    /// and the state directory.
    Init,

    /// Show project status.
    ///
    /// Displays per-collection object counts for both storages, the sync
    /// lock holder, and any pending import snapshot.
    Status,

    /// Compute and print the changelist between active and sync storage.
    ///
    /// Deletes come first (dependents before dependencies), then creates
    /// and updates in dependency order.
    Diff(DiffArgs),

    /// Run import validation without applying anything.
    ///
    /// Reports every dependency and schema error in the staged changelist;
    /// performs zero writes.
    Validate,

    /// Validate and apply the staged changelist to the active storage.
    ///
    /// Acquires the sync lock for the duration. With --batch, applies a
    /// bounded number of entries and persists a snapshot for --resume.
    Import(ImportArgs),

    /// Write the changelist export (JSON) to a file.
    Export(ExportArgs),

    /// Sync lock management.
    Lock(LockCommand),
}

/// Arguments for the diff command.
#[derive(clap::Args, Debug)]
pub struct DiffArgs {
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Arguments for the import command.
#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Apply at most N entries, then persist a snapshot and stop.
    /// Overrides the import_batch_size setting.
    #[arg(long, value_name = "N")]
    pub batch: Option<usize>,

    /// Resume from the snapshot left by a previous batched or interrupted
    /// import instead of computing a fresh changelist.
    #[arg(long)]
    pub resume: bool,

    /// Take over a stale sync lock instead of failing.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the export command.
#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Destination file for the changelist JSON.
    pub path: PathBuf,
}

/// Lock management commands.
#[derive(clap::Args, Debug)]
pub struct LockCommand {
    #[command(subcommand)]
    pub action: LockAction,
}

/// Lock subcommands.
#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// Show the current sync lock holder, if any.
    List,
    /// Remove the sync lock unconditionally.
    Clear,
}
