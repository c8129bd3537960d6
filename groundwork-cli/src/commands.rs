/// Subcommand implementations for the Groundwork CLI
///
/// Every database-touching command loads configuration first; a failed load
/// aborts before any pool is constructed. Commands that apply or revert
/// migrations run over the dedicated single-connection migration pool.

use anyhow::Context;
use chrono::Utc;
use clap::Args;
use groundwork_core::config::AppConfig;
use groundwork_core::db::lifecycle::ClientManager;
use groundwork_core::db::migrations::{
    drop_database, ensure_database_exists, migration_status, revert_last, run_migrations,
};
use groundwork_core::db::pool::{close_pool, health_check, pool_stats};
use std::path::Path;
use tracing::{error, info};

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Exit non-zero when the run fails, instead of the historical
    /// always-zero exit code
    #[arg(long)]
    pub strict_exit: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Short name for the migration, e.g. "create-users"
    pub name: String,
}

#[derive(Args, Debug)]
pub struct DropDbArgs {
    /// Confirm the drop; the command refuses to run without it
    #[arg(long)]
    pub yes: bool,
}

fn load_config() -> anyhow::Result<AppConfig> {
    AppConfig::from_env().context("configuration is invalid")
}

/// Applies pending migrations and maps the outcome to an exit code
///
/// This command exits 0 even when the run fails; the failure is only visible
/// on the error stream. Deployment scripts written against that behavior
/// depend on it, so `--strict-exit` is the opt-in for the real exit code.
pub async fn migrate(migrations: &Path, args: &MigrateArgs) -> anyhow::Result<i32> {
    let config = load_config()?;
    let manager = ClientManager::from_config(&config);

    let pool = manager.migration_pool()?;
    let outcome = run_migrations(&pool, migrations).await;
    close_pool(pool).await;

    match &outcome {
        Ok(report) => info!(applied = report.applied, "Migrations complete"),
        Err(e) => error!("Migration run failed: {}", e),
    }

    Ok(exit_code(outcome.is_err(), args.strict_exit))
}

/// Exit code policy for `migrate`
pub fn exit_code(failed: bool, strict: bool) -> i32 {
    if failed && strict {
        1
    } else {
        0
    }
}

pub async fn status(migrations: &Path, args: &StatusArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let manager = ClientManager::from_config(&config);

    let pool = manager.migration_pool()?;
    let status = migration_status(&pool, migrations).await;
    close_pool(pool).await;
    let status = status?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("applied:    {}", status.applied);
        println!("pending:    {}", status.pending);
        match status.latest_version {
            Some(version) => println!("latest:     {}", version),
            None => println!("latest:     (none)"),
        }
        println!(
            "up to date: {}",
            if status.is_up_to_date { "yes" } else { "no" }
        );
    }

    Ok(())
}

pub async fn check() -> anyhow::Result<()> {
    let config = load_config()?;
    println!("configuration: ok ({} mode)", config.environment);

    let manager = ClientManager::from_config(&config);
    let pool = manager.query_pool()?;
    let probe = health_check(&pool).await;
    let stats = pool_stats(&pool);
    close_pool(pool).await;
    probe.context("database is not reachable")?;

    println!("database:      reachable");
    println!(
        "pool:          {} active / {} idle / {} total",
        stats.active_connections, stats.idle_connections, stats.total_connections
    );

    Ok(())
}

pub async fn rollback(migrations: &Path) -> anyhow::Result<()> {
    let config = load_config()?;
    let manager = ClientManager::from_config(&config);

    let pool = manager.migration_pool()?;
    let reverted = revert_last(&pool, migrations).await;
    close_pool(pool).await;

    match reverted? {
        Some(version) => info!(version, "Reverted migration"),
        None => info!("Nothing to revert"),
    }

    Ok(())
}

/// Creates an empty reversible migration pair in the migrations directory
pub fn add(migrations: &Path, args: &AddArgs) -> anyhow::Result<()> {
    let slug = slugify(&args.name);
    anyhow::ensure!(
        !slug.is_empty(),
        "migration name must contain at least one alphanumeric character"
    );

    std::fs::create_dir_all(migrations)
        .with_context(|| format!("failed to create {}", migrations.display()))?;

    let version = Utc::now().format("%Y%m%d%H%M%S");
    let up = migrations.join(format!("{}_{}.up.sql", version, slug));
    let down = migrations.join(format!("{}_{}.down.sql", version, slug));

    write_new(&up, "-- Add up migration script here\n")?;
    write_new(&down, "-- Add down migration script here\n")?;

    println!("created {}", up.display());
    println!("created {}", down.display());

    Ok(())
}

pub async fn create_db() -> anyhow::Result<()> {
    let config = load_config()?;
    ensure_database_exists(&config.database.url).await?;
    println!("database ready");

    Ok(())
}

pub async fn drop_db(args: &DropDbArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.yes, "refusing to drop the database without --yes");

    let config = load_config()?;
    drop_database(&config.database.url).await?;
    println!("database dropped");

    Ok(())
}

fn write_new(path: &Path, contents: &str) -> anyhow::Result<()> {
    use std::io::Write;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(contents.as_bytes())?;

    Ok(())
}

fn slugify(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}
