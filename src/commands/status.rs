//! The `confsync status` command.
//!
//! Summarizes both storages per collection, the sync lock, and any
//! pending import snapshot.

use super::open_storages;
use crate::context::SyncContext;
use crate::error::Result;
use crate::importer::ImportSnapshot;
use crate::locks;
use crate::storage::ConfigStorage;
use std::collections::BTreeSet;

pub fn cmd_status() -> Result<()> {
    let ctx = SyncContext::resolve()?;
    let (active, sync) = open_storages(&ctx);

    println!("Project: {}", ctx.root.display());
    println!();

    let mut collections: BTreeSet<String> = BTreeSet::new();
    collections.extend(active.collection_names()?);
    collections.extend(sync.collection_names()?);

    println!("{:<24} {:>8} {:>8}", "Collection", "Active", "Sync");
    for collection in &collections {
        let label = if collection.is_empty() {
            "(default)"
        } else {
            collection.as_str()
        };
        let active_count = active.list_all(collection, "")?.len();
        let sync_count = sync.list_all(collection, "")?.len();
        println!("{:<24} {:>8} {:>8}", label, active_count, sync_count);
    }

    println!();
    match locks::read_lock(&ctx)? {
        Some(metadata) => {
            let stale = if metadata.is_stale(ctx.settings.lock_stale_minutes) {
                " (stale)"
            } else {
                ""
            };
            println!(
                "Lock: held by {} for {}{}",
                metadata.owner,
                metadata.age_string(),
                stale
            );
        }
        None => println!("Lock: free"),
    }

    if ctx.snapshot_path().is_file() {
        match ImportSnapshot::load(ctx.snapshot_path()) {
            Ok(snapshot) => println!(
                "Pending import: {} of {} entries applied ({})",
                snapshot.cursor,
                snapshot.entries.len(),
                snapshot.state
            ),
            Err(_) => println!(
                "Pending import: snapshot at '{}' is unreadable",
                ctx.snapshot_path().display()
            ),
        }
    } else {
        println!("Pending import: none");
    }

    Ok(())
}
