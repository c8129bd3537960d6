/// Database layer for Groundwork
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool construction and health checks
/// - `lifecycle`: Client lifecycle manager (mode-dependent pool caching)
/// - `migrations`: Database migration runner
///
/// # Example
///
/// ```no_run
/// use groundwork_core::config::AppConfig;
/// use groundwork_core::db::lifecycle::ClientManager;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = AppConfig::from_env()?;
/// let manager = ClientManager::from_config(&config);
/// let pool = manager.query_pool()?;
/// # Ok(())
/// # }
/// ```

pub mod lifecycle;
pub mod migrations;
pub mod pool;
