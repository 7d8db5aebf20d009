use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use stride_core::ConflictStrategy;

#[derive(Parser)]
#[command(name = "stride")]
#[command(about = "Track shoes and runs locally, sync when you can")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage shoe collections
    Collections {
        #[command(subcommand)]
        command: CollectionCommands,
    },
    /// Manage shoes
    Shoes {
        #[command(subcommand)]
        command: ShoeCommands,
    },
    /// Manage logged runs
    Runs {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Run a sync cycle against the remote API
    Sync {
        /// Conflict strategy for this cycle (defaults to manual)
        #[arg(long, value_parser = parse_strategy)]
        strategy: Option<ConflictStrategy>,
    },
    /// Show sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect and resolve sync conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Manage recorded sync errors
    Errors {
        #[command(subcommand)]
        command: ErrorCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Clone, Copy, Debug, Default)]
pub struct WriteArgs {
    /// Queue the change instead of writing through to the remote
    #[arg(long)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum CollectionCommands {
    /// List collections
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a collection
    Add {
        /// Collection name
        name: String,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
        #[command(flatten)]
        write: WriteArgs,
    },
    /// Delete a collection
    Delete {
        id: String,
        #[command(flatten)]
        write: WriteArgs,
    },
}

#[derive(Subcommand)]
pub enum ShoeCommands {
    /// List shoes
    List {
        /// Only shoes in this collection
        #[arg(long, value_name = "ID")]
        collection: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a shoe to a collection
    Add {
        /// Collection id
        #[arg(long, value_name = "ID")]
        collection: String,
        #[arg(long)]
        brand: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        nickname: Option<String>,
        /// Purchase date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        purchased: Option<String>,
        /// Retirement mileage in km
        #[arg(long, value_name = "KM")]
        max_distance: Option<f64>,
        #[command(flatten)]
        write: WriteArgs,
    },
    /// Delete a shoe
    Delete {
        id: String,
        #[command(flatten)]
        write: WriteArgs,
    },
}

#[derive(Subcommand)]
pub enum RunCommands {
    /// List runs
    List {
        /// Only runs in this shoe
        #[arg(long, value_name = "ID")]
        shoe: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log a run
    Add {
        /// Shoe id
        #[arg(long, value_name = "ID")]
        shoe: String,
        /// Run date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Distance in km
        #[arg(long, value_name = "KM")]
        distance: f64,
        /// Duration in minutes
        #[arg(long, value_name = "MINUTES")]
        duration: Option<f64>,
        #[arg(long)]
        notes: Option<String>,
        #[command(flatten)]
        write: WriteArgs,
    },
    /// Delete a run
    Delete {
        id: String,
        #[command(flatten)]
        write: WriteArgs,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List recorded conflicts
    List {
        /// Include resolved conflicts
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a conflict
    Resolve {
        /// Conflict id or unique id prefix
        id: String,
        #[command(flatten)]
        side: ResolveSide,
    },
    /// Forget resolved conflicts
    Clear,
}

#[derive(Args, Clone, Copy, Debug)]
#[group(required = true, multiple = false)]
pub struct ResolveSide {
    /// Keep the local copy
    #[arg(long)]
    pub use_local: bool,
    /// Keep the remote copy
    #[arg(long)]
    pub use_remote: bool,
}

#[derive(Subcommand)]
pub enum ErrorCommands {
    /// Forget recorded sync errors
    Clear,
}

fn parse_strategy(value: &str) -> Result<ConflictStrategy, String> {
    value.parse().map_err(|error: stride_core::Error| error.to_string())
}
