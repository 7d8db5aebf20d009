use std::path::Path;

use stride_core::models::Table;
use stride_core::util::unix_millis_now;
use stride_core::{SyncState, SyncStatusKind};

use crate::commands::common::{format_relative_time, format_sync_timestamp, open_engine, print_json};
use crate::error::CliError;

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let state = engine.get_sync_state().await?;

    if as_json {
        return print_json(&state);
    }

    for line in format_status_lines(&state, unix_millis_now()) {
        println!("{line}");
    }
    if !engine.is_online() {
        println!("Remote: not configured (changes stay queued locally)");
    }
    for table in Table::ALL {
        let counts = engine.store().count_by_status(table).await?;
        if counts.is_empty() {
            continue;
        }
        let rendered = counts
            .iter()
            .map(|(status, count)| format!("{count} {status}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!("  {table}: {rendered}");
    }
    Ok(())
}

pub fn format_status_lines(state: &SyncState, now_ms: i64) -> Vec<String> {
    let last_sync = state.last_sync.map_or_else(
        || "never".to_string(),
        |timestamp| {
            format!(
                "{} ({})",
                format_sync_timestamp(timestamp),
                format_relative_time(timestamp, now_ms)
            )
        },
    );
    let open_conflicts = state.unresolved_conflicts().count();

    let mut lines = vec![
        format!("Status: {}", status_label(state.status)),
        format!("Last sync: {last_sync}"),
        format!("Pending operations: {}", state.pending_operations),
        format!("Open conflicts: {open_conflicts}"),
    ];
    if let Some(latest) = state.errors.last() {
        lines.push(format!(
            "Errors: {} (latest: {})",
            state.errors.len(),
            latest.message
        ));
    }
    lines
}

const fn status_label(status: SyncStatusKind) -> &'static str {
    match status {
        SyncStatusKind::Idle => "idle",
        SyncStatusKind::Syncing => "syncing",
        SyncStatusKind::Error => "error",
        SyncStatusKind::Conflict => "conflict",
    }
}

pub async fn run_errors_clear(db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    engine.clear_sync_errors().await?;
    println!("Sync errors cleared");
    Ok(())
}
