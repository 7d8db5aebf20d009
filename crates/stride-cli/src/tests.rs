use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use clap_complete::Shell;
use stride_core::models::{SyncOperation, Table};
use stride_core::{Collection, Run, SyncConflict, SyncReport, SyncState, SyncStatusKind};

use crate::cli::{Cli, Commands, ConflictCommands, ResolveSide, WriteArgs};
use crate::commands::collections::{self, format_collection_lines};
use crate::commands::common::{
    format_relative_time, format_sync_conflict_lines, format_sync_timestamp, open_engine_with,
    require_text, resolve_db_path, sync_conflict_to_item, CliRemote,
};
use crate::commands::completions::render_completions;
use crate::commands::conflicts::run_resolve;
use crate::commands::runs::{self, format_run_lines, NewRun};
use crate::commands::shoes::{self, NewShoe};
use crate::commands::status::format_status_lines;
use crate::commands::sync::{format_report_lines, run_sync_with};
use crate::error::CliError;

const OFFLINE: WriteArgs = WriteArgs { offline: true };

#[test]
fn require_text_trims_and_rejects_blank() {
    assert_eq!(require_text("  Road  ", "Name").unwrap(), "Road");
    assert!(matches!(
        require_text(" \t ", "Name"),
        Err(CliError::EmptyValue("Name"))
    ));
}

#[test]
fn resolve_db_path_prefers_flag() {
    let explicit = PathBuf::from("/tmp/explicit-stride.db");
    assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
}

#[test]
fn format_relative_time_buckets() {
    let now = 10 * 24 * 3_600_000;
    assert_eq!(format_relative_time(now - 1_000, now), "just now");
    assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m ago");
    assert_eq!(format_relative_time(now - 3 * 3_600_000, now), "3h ago");
    assert_eq!(format_relative_time(now - 2 * 86_400_000, now), "2d ago");
    assert_eq!(format_relative_time(0, now), "1w ago");
}

#[test]
fn format_sync_timestamp_returns_utc_label() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn conflict_lines_and_items_describe_both_sides() {
    let conflict = SyncConflict::new(
        Table::Shoes,
        "shoe-1",
        SyncOperation::Update,
        serde_json::json!({ "id": "shoe-1", "brand": "Nike" }),
        None,
        0,
    );

    let rendered = format_sync_conflict_lines(std::slice::from_ref(&conflict));
    assert_eq!(rendered.len(), 1);
    assert!(rendered[0].contains("open"));
    assert!(rendered[0].contains("shoes/shoe-1"));
    assert!(rendered[0].contains("remote=deleted"));

    let item = sync_conflict_to_item(&conflict);
    assert_eq!(item.table, "shoes");
    assert!(item.remote_deleted);
    assert_eq!(item.detected_at_iso, "1970-01-01 00:00:00 UTC");
}

#[test]
fn status_lines_summarize_state() {
    let state = SyncState {
        status: SyncStatusKind::Conflict,
        last_sync: None,
        pending_operations: 2,
        ..SyncState::default()
    };
    let lines = format_status_lines(&state, 0);
    assert_eq!(lines[0], "Status: conflict");
    assert_eq!(lines[1], "Last sync: never");
    assert_eq!(lines[2], "Pending operations: 2");
}

#[test]
fn report_lines_list_each_table() {
    let report = SyncReport {
        pushed: 3,
        pulled: Table::ALL
            .iter()
            .map(|table| (*table, stride_core::store::MergeStats::default()))
            .collect(),
        duration: Duration::from_millis(12),
        ..SyncReport::default()
    };
    let lines = format_report_lines(&report);
    assert_eq!(lines[0], "Sync completed in 12 ms");
    assert!(lines[1].contains("pushed 3"));
    assert_eq!(lines.len(), 5);
}

#[test]
fn collection_and_run_lines() {
    let collection = Collection::new("Road").with_description("daily");
    let lines = format_collection_lines(&[collection]);
    assert!(lines[0].contains("Road"));
    assert!(lines[0].contains("(daily)"));

    let mut run = Run::new("shoe-1", "2024-06-01", 10.0);
    run.duration_minutes = Some(50.0);
    let lines = format_run_lines(&[run]);
    assert!(lines[0].contains("2024-06-01"));
    assert!(lines[0].contains("10.0 km"));
    assert!(lines[0].contains("5.00 min/km"));
}

#[test]
fn resolve_requires_exactly_one_side() {
    let cli = Cli::try_parse_from(["stride", "conflicts", "resolve", "abc", "--use-local"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Conflicts {
            command: ConflictCommands::Resolve {
                side: ResolveSide {
                    use_local: true,
                    use_remote: false
                },
                ..
            }
        }
    ));

    assert!(Cli::try_parse_from(["stride", "conflicts", "resolve", "abc"]).is_err());
    assert!(Cli::try_parse_from([
        "stride",
        "conflicts",
        "resolve",
        "abc",
        "--use-local",
        "--use-remote"
    ])
    .is_err());
}

#[test]
fn sync_strategy_flag_is_parsed() {
    let cli = Cli::try_parse_from(["stride", "sync", "--strategy", "remote-wins"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Sync {
            strategy: Some(stride_core::ConflictStrategy::RemoteWins)
        }
    ));
    assert!(Cli::try_parse_from(["stride", "sync", "--strategy", "newest"]).is_err());
}

#[test]
fn completions_use_binary_name() {
    let script = String::from_utf8(render_completions(Shell::Bash)).unwrap();
    assert!(script.contains("stride"));
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "multi_thread")]
async fn offline_adds_are_queued_locally() {
    let db_path = unique_test_db_path();

    let collection = collections::run_add("Road", None, OFFLINE, &db_path)
        .await
        .unwrap();
    let shoe = shoes::run_add(
        NewShoe {
            collection: collection.id.clone(),
            brand: "Brooks".to_string(),
            model: "Ghost".to_string(),
            nickname: None,
            purchased: Some("2024-01-15".to_string()),
            max_distance: Some(700.0),
        },
        OFFLINE,
        &db_path,
    )
    .await
    .unwrap();
    runs::run_add(
        NewRun {
            shoe: shoe.id.clone(),
            date: "2024-02-01".to_string(),
            distance: 8.5,
            duration: None,
            notes: None,
        },
        OFFLINE,
        &db_path,
    )
    .await
    .unwrap();

    let engine = open_engine_with(&db_path, CliRemote::Unconfigured)
        .await
        .unwrap();
    assert!(!engine.is_online());
    let state = engine.get_sync_state().await.unwrap();
    assert_eq!(state.pending_operations, 3);
    assert_eq!(
        engine.get_shoes_in_collection(&collection.id).await.unwrap(),
        vec![shoe]
    );
    drop(engine);

    cleanup_db_files(&db_path);
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "multi_thread")]
async fn adding_shoe_to_unknown_collection_fails() {
    let db_path = unique_test_db_path();

    let error = shoes::run_add(
        NewShoe {
            collection: "missing".to_string(),
            brand: "Hoka".to_string(),
            model: "Mach".to_string(),
            nickname: None,
            purchased: None,
            max_distance: None,
        },
        OFFLINE,
        &db_path,
    )
    .await
    .unwrap_err();
    assert!(matches!(error, CliError::NotFound(_)));

    cleanup_db_files(&db_path);
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "multi_thread")]
async fn run_sync_requires_remote_configuration() {
    let db_path = unique_test_db_path();

    let error = run_sync_with(CliRemote::Unconfigured, None, &db_path)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::SyncNotConfigured));

    cleanup_db_files(&db_path);
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "multi_thread")]
async fn resolving_unknown_conflict_is_not_found() {
    let db_path = unique_test_db_path();

    let error = run_resolve("0199", true, &db_path).await.unwrap_err();
    assert!(matches!(error, CliError::NotFound(_)));

    cleanup_db_files(&db_path);
}

fn unique_test_db_path() -> PathBuf {
    static NEXT_TEST_DB_ID: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    let sequence = NEXT_TEST_DB_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("stride-cli-test-{timestamp}-{sequence}.db"))
}

fn cleanup_db_files(path: &PathBuf) {
    // libsql can hold file handles briefly after drop on Windows
    if cfg!(windows) {
        return;
    }

    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(path.with_extension("db-shm"));
    let _ = std::fs::remove_file(path.with_extension("db-wal"));
}
