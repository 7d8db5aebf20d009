use std::path::Path;

use stride_core::Run;

use crate::cli::{RunCommands, WriteArgs};
use crate::commands::common::{open_engine, print_json, require_text, short_id};
use crate::error::CliError;

pub struct NewRun {
    pub shoe: String,
    pub date: String,
    pub distance: f64,
    pub duration: Option<f64>,
    pub notes: Option<String>,
}

pub async fn run_runs(command: RunCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        RunCommands::List { shoe, json } => run_list(shoe.as_deref(), json, db_path).await,
        RunCommands::Add {
            shoe,
            date,
            distance,
            duration,
            notes,
            write,
        } => {
            let run = NewRun {
                shoe,
                date,
                distance,
                duration,
                notes,
            };
            run_add(run, write, db_path).await.map(|_| ())
        }
        RunCommands::Delete { id, write } => run_delete(&id, write, db_path).await,
    }
}

async fn run_list(shoe: Option<&str>, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let mut runs = match shoe {
        Some(shoe_id) => engine.get_runs_for_shoe(shoe_id).await?,
        None => engine.get_runs().await?,
    };
    runs.sort_by(|left, right| right.date.cmp(&left.date));

    if as_json {
        return print_json(&runs);
    }
    if runs.is_empty() {
        println!("No runs logged.");
        return Ok(());
    }
    for line in format_run_lines(&runs) {
        println!("{line}");
    }
    let total: f64 = runs.iter().map(|run| run.distance_km).sum();
    println!("{} runs, {total:.1} km", runs.len());
    Ok(())
}

pub async fn run_add(new_run: NewRun, write: WriteArgs, db_path: &Path) -> Result<Run, CliError> {
    let shoe_id = require_text(&new_run.shoe, "Shoe id")?;
    let mut run = Run::new(
        shoe_id.as_str(),
        require_text(&new_run.date, "Date")?,
        new_run.distance,
    );
    run.duration_minutes = new_run.duration;
    run.notes = new_run.notes;

    let engine = open_engine(db_path).await?;
    if engine.get_shoe(&shoe_id).await?.is_none() {
        return Err(CliError::NotFound(format!("shoe {shoe_id}")));
    }
    let saved = engine.save_run(&run, write.offline).await?;
    println!("{}", saved.id);
    Ok(saved)
}

async fn run_delete(id: &str, write: WriteArgs, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    if !engine.delete_run(id, write.offline).await? {
        return Err(CliError::NotFound(format!("run {id}")));
    }
    println!("Deleted run {id}");
    Ok(())
}

pub fn format_run_lines(runs: &[Run]) -> Vec<String> {
    runs.iter()
        .map(|run| {
            let pace = run
                .pace_min_per_km()
                .map_or_else(String::new, |pace| format!("  {pace:.2} min/km"));
            format!(
                "{:<13}  {}  {:>6.1} km  shoe={}{pace}",
                short_id(&run.id),
                run.date,
                run.distance_km,
                short_id(&run.shoe_id)
            )
        })
        .collect()
}
