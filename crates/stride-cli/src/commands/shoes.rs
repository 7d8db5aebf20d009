use std::path::Path;

use stride_core::Shoe;

use crate::cli::{ShoeCommands, WriteArgs};
use crate::commands::common::{open_engine, print_json, require_text, short_id};
use crate::error::CliError;

pub struct NewShoe {
    pub collection: String,
    pub brand: String,
    pub model: String,
    pub nickname: Option<String>,
    pub purchased: Option<String>,
    pub max_distance: Option<f64>,
}

pub async fn run_shoes(command: ShoeCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        ShoeCommands::List { collection, json } => {
            run_list(collection.as_deref(), json, db_path).await
        }
        ShoeCommands::Add {
            collection,
            brand,
            model,
            nickname,
            purchased,
            max_distance,
            write,
        } => {
            let shoe = NewShoe {
                collection,
                brand,
                model,
                nickname,
                purchased,
                max_distance,
            };
            run_add(shoe, write, db_path).await.map(|_| ())
        }
        ShoeCommands::Delete { id, write } => run_delete(&id, write, db_path).await,
    }
}

async fn run_list(collection: Option<&str>, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let shoes = match collection {
        Some(collection_id) => engine.get_shoes_in_collection(collection_id).await?,
        None => engine.get_shoes().await?,
    };

    if as_json {
        return print_json(&shoes);
    }
    if shoes.is_empty() {
        println!("No shoes found.");
        return Ok(());
    }
    for line in format_shoe_lines(&shoes) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_add(new_shoe: NewShoe, write: WriteArgs, db_path: &Path) -> Result<Shoe, CliError> {
    let collection_id = require_text(&new_shoe.collection, "Collection id")?;
    let mut shoe = Shoe::new(
        collection_id.as_str(),
        require_text(&new_shoe.brand, "Brand")?,
        require_text(&new_shoe.model, "Model")?,
    );
    shoe.nickname = new_shoe.nickname;
    shoe.purchase_date = new_shoe.purchased;
    shoe.max_distance_km = new_shoe.max_distance;

    let engine = open_engine(db_path).await?;
    if engine.get_collection(&collection_id).await?.is_none() {
        return Err(CliError::NotFound(format!("collection {collection_id}")));
    }
    let saved = engine.save_shoe(&shoe, write.offline).await?;
    println!("{}", saved.id);
    Ok(saved)
}

async fn run_delete(id: &str, write: WriteArgs, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    if !engine.delete_shoe(id, write.offline).await? {
        return Err(CliError::NotFound(format!("shoe {id}")));
    }
    println!("Deleted shoe {id}");
    Ok(())
}

pub fn format_shoe_lines(shoes: &[Shoe]) -> Vec<String> {
    shoes
        .iter()
        .map(|shoe| {
            let retired = if shoe.retired { "  [retired]" } else { "" };
            format!(
                "{:<13}  {:<30}  collection={}{retired}",
                short_id(&shoe.id),
                shoe.display_name(),
                short_id(&shoe.collection_id)
            )
        })
        .collect()
}
