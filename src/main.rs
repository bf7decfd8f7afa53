//! # Catalog Steward CLI (`steward`)
//!
//! The `steward` binary is the operator interface for Catalog Steward. It
//! initializes the database, imports records, runs quality analysis,
//! standardization and duplicate merges, and starts the admin HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! steward --config ./config/steward.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `steward init` | Create the SQLite database and run schema migrations |
//! | `steward import <category> <file>` | Load a JSON array of records |
//! | `steward categories` | List categories with a field schema |
//! | `steward fields <category>` | Print a category's field definitions |
//! | `steward analyze <category>` | Quality report and duplicate groups |
//! | `steward standardize <category>` | Fill missing fields below the threshold |
//! | `steward merge <category>` | Merge duplicate groups |
//! | `steward get <category> <id>` | Print one record |
//! | `steward serve` | Start the admin HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! steward init
//! steward import nutrient ./data/nutrients.json
//! steward analyze nutrient
//! steward merge nutrient --dry-run
//! steward standardize nutrient --json
//! ```
//!
//! Logs go to stderr and are filtered by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use catalog_steward::{commands, config, migrate, server};

/// Catalog Steward CLI: data-quality, standardization and duplicate-merge
/// engine for nutrition catalog records.
///
/// All commands except `categories` and `fields` read a TOML configuration
/// file. See `config/steward.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "steward",
    about = "Catalog Steward: quality analysis, standardization and duplicate merging for catalog records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/steward.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Import records from a JSON file.
    ///
    /// The file must contain a JSON array of objects, each with a string
    /// `id`. Records are stored under `{category}:{id}`, replacing any
    /// existing record with the same id.
    Import {
        category: String,
        file: PathBuf,
    },

    /// List categories that have a field schema.
    Categories,

    /// Print the field definitions of a category as JSON.
    Fields { category: String },

    /// Score every record and report duplicates.
    Analyze {
        category: String,

        /// Print the full analysis as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Fill missing fields of records below the completeness threshold.
    Standardize {
        category: String,

        /// Compute the result without writing to the database.
        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        json: bool,
    },

    /// Merge records that share a normalized name.
    Merge {
        category: String,

        /// Show the planned merges without writing to the database.
        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        json: bool,
    },

    /// Print one record as JSON.
    Get { category: String, id: String },

    /// Start the admin HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // Commands that don't require config
    match &cli.command {
        Commands::Categories => return commands::run_categories(),
        Commands::Fields { category } => return commands::run_fields(category),
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { category, file } => {
            commands::run_import(&cfg, &category, &file).await?;
        }
        Commands::Analyze { category, json } => {
            commands::run_analyze(&cfg, &category, json).await?;
        }
        Commands::Standardize {
            category,
            dry_run,
            json,
        } => {
            commands::run_standardize(&cfg, &category, dry_run, json).await?;
        }
        Commands::Merge {
            category,
            dry_run,
            json,
        } => {
            commands::run_merge(&cfg, &category, dry_run, json).await?;
        }
        Commands::Get { category, id } => {
            commands::run_get(&cfg, &category, &id).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Categories | Commands::Fields { .. } => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}
