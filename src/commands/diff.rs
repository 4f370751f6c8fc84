//! The `confsync diff` and `confsync export` commands.
//!
//! Both commands run the comparer read-only; diff prints the changelist,
//! export writes its JSON form for tooling consumption.

use super::open_storages;
use crate::cli::{DiffArgs, ExportArgs, OutputFormat};
use crate::comparer::{Changelist, StorageComparer};
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::events::{Event, EventAction, append_event};
use crate::fs::atomic_write_file;
use serde_json::json;

pub fn cmd_diff(args: DiffArgs) -> Result<()> {
    let ctx = SyncContext::resolve()?;
    let changelist = compute_changelist(&ctx)?;

    match args.format {
        OutputFormat::Text => {
            if changelist.is_empty() {
                println!("No differences between active and sync storage.");
            } else {
                for entry in changelist.entries() {
                    println!("{}", entry.describe());
                }
                println!();
                println!("{} change(s).", changelist.len());
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&changelist.to_export()).map_err(|e| {
                SyncError::UserError(format!("failed to serialize changelist: {}", e))
            })?;
            println!("{}", json);
        }
    }

    Ok(())
}

pub fn cmd_export(args: ExportArgs) -> Result<()> {
    let ctx = SyncContext::resolve()?;
    let changelist = compute_changelist(&ctx)?;

    let json = serde_json::to_string_pretty(&changelist.to_export())
        .map_err(|e| SyncError::UserError(format!("failed to serialize changelist: {}", e)))?;
    atomic_write_file(&args.path, &json)?;

    println!(
        "Exported {} change(s) to '{}'.",
        changelist.len(),
        args.path.display()
    );
    Ok(())
}

/// Diff the two storages and record the diff event.
pub(crate) fn compute_changelist(ctx: &SyncContext) -> Result<Changelist> {
    let (active, sync) = open_storages(ctx);
    let changelist = StorageComparer::new(&active, &sync).create_changelist()?;

    append_event(
        ctx,
        &Event::new(EventAction::Diff).with_details(json!({"changes": changelist.len()})),
    )?;

    Ok(changelist)
}
