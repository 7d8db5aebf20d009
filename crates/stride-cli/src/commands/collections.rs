use std::path::Path;

use stride_core::Collection;

use crate::cli::{CollectionCommands, WriteArgs};
use crate::commands::common::{open_engine, print_json, require_text, short_id};
use crate::error::CliError;

pub async fn run_collections(command: CollectionCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        CollectionCommands::List { json } => run_list(json, db_path).await,
        CollectionCommands::Add {
            name,
            description,
            write,
        } => run_add(&name, description, write, db_path).await.map(|_| ()),
        CollectionCommands::Delete { id, write } => run_delete(&id, write, db_path).await,
    }
}

async fn run_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let collections = engine.get_collections().await?;

    if as_json {
        return print_json(&collections);
    }
    if collections.is_empty() {
        println!("No collections yet.");
        return Ok(());
    }
    for line in format_collection_lines(&collections) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_add(
    name: &str,
    description: Option<String>,
    write: WriteArgs,
    db_path: &Path,
) -> Result<Collection, CliError> {
    let mut collection = Collection::new(require_text(name, "Collection name")?);
    collection.description = description;

    let engine = open_engine(db_path).await?;
    let saved = engine.save_collection(&collection, write.offline).await?;
    println!("{}", saved.id);
    Ok(saved)
}

async fn run_delete(id: &str, write: WriteArgs, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    if !engine.delete_collection(id, write.offline).await? {
        return Err(CliError::NotFound(format!("collection {id}")));
    }
    println!("Deleted collection {id}");
    Ok(())
}

pub fn format_collection_lines(collections: &[Collection]) -> Vec<String> {
    collections
        .iter()
        .map(|collection| match &collection.description {
            Some(description) => format!(
                "{:<13}  {}  ({description})",
                short_id(&collection.id),
                collection.name
            ),
            None => format!("{:<13}  {}", short_id(&collection.id), collection.name),
        })
        .collect()
}
