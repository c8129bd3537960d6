//! # Groundwork CLI
//!
//! Database bootstrap and migration tool. Validates the process environment,
//! manages the connection pool lifecycle, and applies schema migrations:
//!
//! - `migrate`: apply pending migrations over a dedicated single-connection pool
//! - `status`: show applied and pending migrations
//! - `check`: validate configuration and probe database connectivity
//! - `rollback`: revert the most recently applied migration
//! - `add`: create an empty timestamped migration file pair
//! - `create-db` / `drop-db`: one-shot database provisioning helpers
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgres://u:p@localhost:5432/db APP_ENV=development \
//!     groundwork migrate
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "groundwork",
    version,
    about = "Environment-validated database bootstrap and migration runner"
)]
struct Cli {
    /// Directory holding migration files
    #[arg(long, default_value = "./migrations", global = true)]
    migrations: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply all pending migrations
    Migrate(commands::MigrateArgs),
    /// Show applied and pending migrations
    Status(commands::StatusArgs),
    /// Validate configuration and probe database connectivity
    Check,
    /// Revert the most recently applied migration
    Rollback,
    /// Create an empty timestamped migration file pair
    Add(commands::AddArgs),
    /// Create the configured database if it does not exist
    CreateDb,
    /// Drop the configured database, deleting all data
    DropDb(commands::DropDbArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "groundwork=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate(args) => {
            let code = commands::migrate(&cli.migrations, &args).await?;
            std::process::exit(code)
        }
        Commands::Status(args) => commands::status(&cli.migrations, &args).await,
        Commands::Check => commands::check().await,
        Commands::Rollback => commands::rollback(&cli.migrations).await,
        Commands::Add(args) => commands::add(&cli.migrations, &args),
        Commands::CreateDb => commands::create_db().await,
        Commands::DropDb(args) => commands::drop_db(&args).await,
    }
}
