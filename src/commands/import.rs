//! The `confsync validate` and `confsync import` commands.
//!
//! `validate` runs the import validation phase read-only and reports every
//! error. `import` acquires the sync lock, validates, then applies the
//! changelist; with --batch it persists a snapshot between invocations so
//! an external stepper can drive the import incrementally.

use super::{build_validator, open_storages};
use crate::cli::ImportArgs;
use crate::comparer::StorageComparer;
use crate::context::SyncContext;
use crate::entity::{ConfigEntity, EntityTypeRegistry};
use crate::error::{Result, SyncError};
use crate::events::{Event, EventAction, append_event};
use crate::importer::{ConfigImporter, ImportSnapshot, ImportState, ImportValidationResult};
use crate::locks::SyncLock;
use crate::object::DEFAULT_COLLECTION;
use crate::storage::{ConfigStorage, read_collection};
use serde_json::json;
use std::fs;

pub fn cmd_validate() -> Result<()> {
    let ctx = SyncContext::resolve()?;
    let (active, sync) = open_storages(&ctx);

    let changelist = StorageComparer::new(&active, &sync).create_changelist()?;
    if changelist.is_empty() {
        println!("Nothing to validate; active storage is up to date.");
        return Ok(());
    }

    for warning in dependency_warnings(&ctx, &sync)? {
        println!("warning: {}", warning);
    }

    let validator = build_validator(&ctx);
    let mut importer = ConfigImporter::new(changelist);
    importer.validate(&active, &sync, &validator)?;

    let skipped = importer
        .validation_results()
        .iter()
        .filter(|r| matches!(r, ImportValidationResult::Skipped))
        .count();
    let errors = importer.validation_errors();

    append_event(
        &ctx,
        &Event::new(EventAction::Validate).with_details(json!({
            "entries": importer.changelist().len(),
            "errors": errors.len(),
        })),
    )?;

    if errors.is_empty() {
        println!(
            "{} entr{} valid ({} already satisfied).",
            importer.changelist().len(),
            if importer.changelist().len() == 1 { "y" } else { "ies" },
            skipped
        );
        return Ok(());
    }

    for error in &errors {
        eprintln!("error: {}", error);
    }
    Err(SyncError::Validation(format!(
        "{} error(s); the import would be aborted",
        errors.len()
    )))
}

pub fn cmd_import(args: ImportArgs) -> Result<()> {
    let ctx = SyncContext::resolve()?;

    let lock = if args.force {
        SyncLock::acquire_force_stale(&ctx, "import")?
    } else {
        SyncLock::acquire(&ctx, "import")?
    };

    let result = run_import(&ctx, &args);
    lock.release()?;
    result
}

fn run_import(ctx: &SyncContext, args: &ImportArgs) -> Result<()> {
    let (mut active, sync) = open_storages(ctx);

    let mut importer = if args.resume {
        if !ctx.snapshot_path().is_file() {
            return Err(SyncError::UserError(
                "no import snapshot to resume; run 'confsync import' without --resume".to_string(),
            ));
        }
        ConfigImporter::from_snapshot(ImportSnapshot::load(ctx.snapshot_path())?)?
    } else {
        let changelist = StorageComparer::new(&active, &sync).create_changelist()?;
        if changelist.is_empty() {
            println!("Nothing to import; active storage is up to date.");
            discard_snapshot(ctx);
            return Ok(());
        }

        let validator = build_validator(ctx);
        let mut importer = ConfigImporter::new(changelist);
        importer.validate(&active, &sync, &validator)?;

        if importer.state() == ImportState::Aborted {
            let errors = importer.validation_errors();
            for error in &errors {
                eprintln!("error: {}", error);
            }
            append_event(
                ctx,
                &Event::new(EventAction::ImportAborted)
                    .with_details(json!({"errors": errors.len()})),
            )?;
            return Err(SyncError::Validation(format!(
                "{} error(s); nothing was imported",
                errors.len()
            )));
        }
        importer
    };

    append_event(
        ctx,
        &Event::new(EventAction::ImportStart)
            .with_details(json!({"pending": importer.remaining_entries().len()})),
    )?;

    let batch = args.batch.or_else(|| {
        (ctx.settings.import_batch_size > 0).then_some(ctx.settings.import_batch_size)
    });

    let before = importer.applied_entries().len();
    let outcome = importer.apply(&mut active, &sync, batch);
    let after = importer.applied_entries().len();

    for index in before..after {
        let entry = &importer.changelist().entries()[index];
        let skipped = matches!(
            importer.validation_results().get(index),
            Some(ImportValidationResult::Skipped)
        );
        append_event(
            ctx,
            &Event::new(EventAction::EntryApplied)
                .with_target(&entry.collection, &entry.name)
                .with_details(json!({
                    "operation": entry.op.keyword(),
                    "skipped": skipped,
                })),
        )?;
    }

    match outcome {
        Ok(progress) if progress.complete => {
            discard_snapshot(ctx);
            append_event(
                ctx,
                &Event::new(EventAction::ImportCompleted)
                    .with_details(json!({"applied": progress.applied, "skipped": progress.skipped})),
            )?;
            println!(
                "Import complete: {} entr{} applied, {} skipped.",
                progress.applied,
                if progress.applied == 1 { "y" } else { "ies" },
                progress.skipped
            );
            Ok(())
        }
        Ok(progress) => {
            importer.snapshot().save(ctx.snapshot_path())?;
            println!(
                "Applied {} entr{} ({} skipped), {} remaining.",
                progress.applied,
                if progress.applied == 1 { "y" } else { "ies" },
                progress.skipped,
                progress.remaining
            );
            println!("Re-run 'confsync import --resume' to continue.");
            Ok(())
        }
        Err(error) => {
            importer.snapshot().save(ctx.snapshot_path())?;
            let applied = importer.applied_entries().len();
            let remaining = importer.remaining_entries().len();
            append_event(
                ctx,
                &Event::new(EventAction::ImportFailed)
                    .with_details(json!({"applied": applied, "remaining": remaining})),
            )?;
            eprintln!(
                "Import interrupted: {} entr{} applied, {} remaining (starting with '{}').",
                applied,
                if applied == 1 { "y" } else { "ies" },
                remaining,
                importer
                    .remaining_entries()
                    .first()
                    .map(|e| e.name.as_str())
                    .unwrap_or("?")
            );
            eprintln!("Applied entries stay applied; fix the storage and re-run with --resume.");
            Err(error)
        }
    }
}

/// Remove a leftover snapshot, if any.
fn discard_snapshot(ctx: &SyncContext) {
    if ctx.snapshot_path().is_file() {
        let _ = fs::remove_file(ctx.snapshot_path());
    }
}

/// Warn when an entity's declared config dependencies disagree with what
/// its data actually references, per the declarative entity-type mappings.
fn dependency_warnings(ctx: &SyncContext, sync: &dyn ConfigStorage) -> Result<Vec<String>> {
    let registry = EntityTypeRegistry::new(ctx.settings.entity_types.clone());
    let mut warnings = Vec::new();

    for object in read_collection(sync, DEFAULT_COLLECTION)? {
        let entity = ConfigEntity::new(object);
        let Some(def) = registry.type_of(entity.name()) else {
            continue;
        };
        if def.config_reference_paths.is_empty() && def.content_reference_paths.is_empty() {
            continue;
        }

        let declared = entity.dependencies();
        let calculated = entity.calculate_dependencies(&registry);
        if declared.effective_config() != calculated.effective_config() {
            warnings.push(format!(
                "'{}' declares config dependencies [{}] but its data references [{}]",
                entity.name(),
                declared.effective_config().join(", "),
                calculated.effective_config().join(", ")
            ));
        }
    }

    Ok(warnings)
}
