//! Confsync: file-based configuration synchronization engine with
//! dependency-aware staged imports.
//!
//! This is the main entry point for the `confsync` CLI. It parses
//! arguments, dispatches to the appropriate command handler, and handles
//! errors with proper exit codes.

mod cli;
mod commands;
pub mod comparer;
pub mod context;
pub mod entity;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod fs;
pub mod graph;
pub mod importer;
pub mod locks;
pub mod object;
pub mod schema;
pub mod settings;
pub mod storage;

#[cfg(test)]
mod test_support;

use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match commands::dispatch(cli.command) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            ExitCode::from(err.exit_code() as u8)
        }
    }
}
