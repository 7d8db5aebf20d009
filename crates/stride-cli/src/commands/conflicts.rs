use std::path::Path;

use crate::cli::ConflictCommands;
use crate::commands::common::{
    format_sync_conflict_lines, open_engine, print_json, sync_conflict_to_item, SyncConflictItem,
};
use crate::error::CliError;

pub async fn run_conflicts(command: ConflictCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        ConflictCommands::List { all, json } => run_list(all, json, db_path).await,
        ConflictCommands::Resolve { id, side } => run_resolve(&id, side.use_local, db_path).await,
        ConflictCommands::Clear => run_clear(db_path).await,
    }
}

async fn run_list(include_resolved: bool, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let conflicts = engine
        .get_sync_state()
        .await?
        .conflicts
        .into_iter()
        .filter(|conflict| include_resolved || !conflict.resolved)
        .collect::<Vec<_>>();

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        return print_json(&json_items);
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }
    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

/// Resolve by full id or a unique id prefix.
pub async fn run_resolve(id: &str, use_local: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let matches = engine
        .get_sync_state()
        .await?
        .conflicts
        .into_iter()
        .filter(|conflict| !conflict.resolved && conflict.id.starts_with(id))
        .map(|conflict| conflict.id)
        .collect::<Vec<_>>();
    let conflict_id = match matches.as_slice() {
        [single] => single.clone(),
        [] => return Err(CliError::NotFound(format!("open conflict {id}"))),
        _ => {
            return Err(CliError::NotFound(format!(
                "conflict prefix {id} is ambiguous ({} matches)",
                matches.len()
            )))
        }
    };

    let resolved = engine
        .resolve_conflict_manually(&conflict_id, use_local)
        .await?;
    println!(
        "Resolved {}/{} with the {} copy",
        resolved.entity_type,
        resolved.entity_id,
        if use_local { "local" } else { "remote" }
    );
    Ok(())
}

async fn run_clear(db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let removed = engine.clear_resolved_conflicts().await?;
    println!("Cleared {removed} resolved conflicts");
    Ok(())
}
