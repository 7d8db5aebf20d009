use std::path::Path;

use stride_core::{ConflictStrategy, CycleOutcome, SyncReport};

use crate::commands::common::{open_engine_with, CliRemote};
use crate::error::CliError;

pub async fn run_sync(
    strategy: Option<ConflictStrategy>,
    db_path: &Path,
) -> Result<SyncReport, CliError> {
    run_sync_with(CliRemote::from_env()?, strategy, db_path).await
}

pub async fn run_sync_with(
    remote: CliRemote,
    strategy: Option<ConflictStrategy>,
    db_path: &Path,
) -> Result<SyncReport, CliError> {
    if !remote.is_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let engine = open_engine_with(db_path, remote).await?;
    let orchestrator = engine.orchestrator();
    let strategy = strategy.unwrap_or(orchestrator.config().strategy);
    match orchestrator.sync_with(strategy).await {
        CycleOutcome::Completed(report) => {
            for line in format_report_lines(&report) {
                println!("{line}");
            }
            Ok(report)
        }
        CycleOutcome::Skipped => Err(CliError::SyncInProgress),
        CycleOutcome::Failed(message) => Err(CliError::SyncFailed(message)),
    }
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Sync completed in {} ms",
        report.duration.as_millis()
    )];
    lines.push(format!(
        "  pushed {}, retrying {}, dropped {}",
        report.pushed, report.retried, report.dropped
    ));
    if report.conflicts > 0 || report.resolved > 0 {
        lines.push(format!(
            "  conflicts {}, resolved {}",
            report.conflicts, report.resolved
        ));
    }
    for (table, stats) in &report.pulled {
        lines.push(format!(
            "  {table}: {} updated, {} unchanged, {} kept local, {} removed",
            stats.upserted, stats.unchanged, stats.skipped, stats.removed
        ));
    }
    lines
}
