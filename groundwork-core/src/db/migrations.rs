/// Database migration runner
///
/// Migrations are resolved from a directory at runtime and applied through
/// sqlx's migration engine. Each migration consists of an "up" file and an
/// optional "down" file:
///
/// - `{version}_{name}.up.sql` / `{version}_{name}.down.sql` (reversible)
/// - `{version}_{name}.sql` (forward-only)
///
/// The runner applies pending migrations in version order and never retries:
/// a failed run requires operator intervention and a fresh invocation.
///
/// # Example
///
/// ```no_run
/// use groundwork_core::config::AppConfig;
/// use groundwork_core::db::lifecycle::ClientManager;
/// use groundwork_core::db::migrations::run_migrations;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = AppConfig::from_env()?;
/// let manager = ClientManager::from_config(&config);
///
/// let pool = manager.migration_pool()?;
/// let report = run_migrations(&pool, "./migrations").await?;
/// println!("applied {} migrations", report.applied);
/// # Ok(())
/// # }
/// ```

use serde::Serialize;
use sqlx::migrate::{MigrateDatabase, Migrator};
use sqlx::postgres::PgPool;
use sqlx::Postgres;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Errors from loading or applying migrations
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The migrations directory could not be read or parsed
    #[error("failed to load migrations from {}: {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: sqlx::migrate::MigrateError,
    },

    /// The migration engine rejected or failed a migration
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A query against the migrations bookkeeping table failed
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Outcome of a successful migration run
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Number of migrations newly applied by this run
    pub applied: usize,
}

/// Migration status information
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// Number of migrations that have been applied
    pub applied: usize,

    /// Number of migrations in the directory not yet applied
    pub pending: usize,

    /// Latest applied migration version
    pub latest_version: Option<i64>,

    /// Whether the database schema is up to date with the directory
    pub is_up_to_date: bool,
}

/// Runs all pending migrations from the given directory
///
/// Pending migrations are applied in version order; sqlx applies each one
/// transactionally where the statements allow it. On failure the error is
/// returned as-is — there is no automatic retry and no partial rollback
/// beyond what the engine itself guarantees.
///
/// # Errors
///
/// Returns an error if:
/// - The migrations directory cannot be read
/// - A migration file is malformed
/// - A migration fails to execute
/// - The database connection is lost during the run
pub async fn run_migrations(
    pool: &PgPool,
    directory: impl AsRef<Path>,
) -> Result<MigrationReport, MigrationError> {
    let directory = directory.as_ref();
    info!(directory = %directory.display(), "Starting database migrations");

    let migrator = load_migrator(directory).await?;
    let already_applied = applied_versions(pool).await?.len();

    match migrator.run(pool).await {
        Ok(()) => {
            let applied = applied_versions(pool).await?.len().saturating_sub(already_applied);
            info!(applied, "Database migrations completed successfully");
            Ok(MigrationReport { applied })
        }
        Err(e) => {
            warn!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}

/// Gets the current migration status
///
/// Compares the bookkeeping table against the migration directory, so
/// `pending` and `is_up_to_date` reflect the actual source tree. A database
/// that has never been migrated (no bookkeeping table) reports zero applied.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or the bookkeeping
/// query fails.
pub async fn migration_status(
    pool: &PgPool,
    directory: impl AsRef<Path>,
) -> Result<MigrationStatus, MigrationError> {
    let directory = directory.as_ref();
    debug!(directory = %directory.display(), "Checking migration status");

    let migrator = load_migrator(directory).await?;
    let applied = applied_versions(pool).await?;
    let applied_set: HashSet<i64> = applied.iter().copied().collect();

    let pending = migrator
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .filter(|m| !applied_set.contains(&m.version))
        .count();

    debug!(
        applied = applied.len(),
        pending,
        "Migration status retrieved"
    );

    Ok(MigrationStatus {
        applied: applied.len(),
        pending,
        latest_version: applied.last().copied(),
        is_up_to_date: pending == 0,
    })
}

/// Reverts the most recently applied migration
///
/// Returns the reverted version, or `None` when no migration is applied.
/// Requires the migration to have a "down" file.
///
/// # Errors
///
/// Returns an error if the directory cannot be read, the bookkeeping query
/// fails, or the down migration fails to execute.
pub async fn revert_last(
    pool: &PgPool,
    directory: impl AsRef<Path>,
) -> Result<Option<i64>, MigrationError> {
    let directory = directory.as_ref();

    let migrator = load_migrator(directory).await?;
    let applied = applied_versions(pool).await?;

    let Some(&last) = applied.last() else {
        info!("No applied migrations to revert");
        return Ok(None);
    };

    // Undo everything above the second-to-latest version, i.e. exactly the
    // latest migration.
    let target = applied.iter().rev().nth(1).copied().unwrap_or(0);

    warn!(version = last, "Reverting most recent migration");
    migrator.undo(pool, target).await?;

    Ok(Some(last))
}

/// Creates the database if it doesn't exist
///
/// Useful for development and testing; in production the database should
/// already exist.
///
/// # Errors
///
/// Returns an error if the server is unreachable or the caller lacks
/// permission to create databases.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), MigrationError> {
    if !Postgres::database_exists(database_url).await? {
        info!("Database does not exist, creating it");
        Postgres::create_database(database_url).await?;
        info!("Database created successfully");
    } else {
        debug!("Database already exists");
    }

    Ok(())
}

/// Drops the database, deleting all data
///
/// Development and testing only.
///
/// # Errors
///
/// Returns an error if the server is unreachable, the caller lacks
/// permission, or the database is in use by other connections.
pub async fn drop_database(database_url: &str) -> Result<(), MigrationError> {
    warn!("Dropping database");

    if Postgres::database_exists(database_url).await? {
        Postgres::drop_database(database_url).await?;
        info!("Database dropped successfully");
    } else {
        debug!("Database does not exist, nothing to drop");
    }

    Ok(())
}

async fn load_migrator(directory: &Path) -> Result<Migrator, MigrationError> {
    Migrator::new(directory)
        .await
        .map_err(|source| MigrationError::Source {
            path: directory.to_path_buf(),
            source,
        })
}

/// Versions recorded as successfully applied, in ascending order
///
/// Tolerates a database that has never been migrated: a missing bookkeeping
/// table reads as zero applied migrations.
async fn applied_versions(pool: &PgPool) -> Result<Vec<i64>, sqlx::Error> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_name = '_sqlx_migrations'
        )",
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        debug!("Migrations table does not exist yet");
        return Ok(Vec::new());
    }

    sqlx::query_scalar(
        "SELECT version FROM _sqlx_migrations WHERE success = true ORDER BY version",
    )
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_directory_is_a_source_error() {
        let err = load_migrator(Path::new("/nonexistent/migrations"))
            .await
            .unwrap_err();

        match err {
            MigrationError::Source { path, .. } => {
                assert_eq!(path, Path::new("/nonexistent/migrations"));
            }
            other => panic!("expected Source error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_directory_loads_zero_migrations() {
        let dir = tempfile::tempdir().unwrap();

        let migrator = load_migrator(dir.path()).await.unwrap();
        assert_eq!(migrator.iter().count(), 0);
    }

    #[tokio::test]
    async fn test_directory_files_are_resolved() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("20240101000000_create_users.up.sql"),
            "CREATE TABLE users (id BIGSERIAL PRIMARY KEY);",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("20240101000000_create_users.down.sql"),
            "DROP TABLE users;",
        )
        .unwrap();

        let migrator = load_migrator(dir.path()).await.unwrap();
        let ups: Vec<i64> = migrator
            .iter()
            .filter(|m| !m.migration_type.is_down_migration())
            .map(|m| m.version)
            .collect();
        assert_eq!(ups, vec![20240101000000]);
    }
}
