/// End-to-end tests for the configuration loader and client lifecycle
///
/// These run against lazy pools, so no PostgreSQL server is required: pool
/// construction reserves the pool without dialing a connection.

use groundwork_core::config::{AppConfig, Environment};
use groundwork_core::db::lifecycle::ClientManager;

fn dev_vars() -> Vec<(String, String)> {
    vec![
        (
            "DATABASE_URL".to_string(),
            "postgres://u:p@localhost:5432/db".to_string(),
        ),
        ("APP_ENV".to_string(), "development".to_string()),
    ]
}

#[tokio::test]
async fn development_reuses_one_query_pool() {
    let config = AppConfig::from_vars(dev_vars()).unwrap();
    let manager = ClientManager::from_config(&config);

    assert!(!manager.has_cached_pool());

    let first = manager.query_pool().unwrap();
    assert!(manager.has_cached_pool());

    let second = manager.query_pool().unwrap();

    // Both handles refer to one underlying pool: closing through the first
    // is observable through the second.
    first.close().await;
    assert!(second.is_closed());
}

#[tokio::test]
async fn production_builds_a_fresh_pool_per_call() {
    let mut vars = dev_vars();
    vars[1].1 = "production".to_string();

    let config = AppConfig::from_vars(vars).unwrap();
    assert_eq!(config.environment, Environment::Production);

    let manager = ClientManager::from_config(&config);
    let first = manager.query_pool().unwrap();
    let second = manager.query_pool().unwrap();

    // Independent pools: closing the first leaves the second usable, and
    // nothing is cached no matter how often it is called.
    first.close().await;
    assert!(!second.is_closed());
    assert!(!manager.has_cached_pool());
}

#[test]
fn migration_pool_never_touches_the_cache() {
    let config = AppConfig::from_vars(dev_vars()).unwrap();
    let manager = ClientManager::from_config(&config);

    let _migration = manager.migration_pool().unwrap();
    assert!(!manager.has_cached_pool());

    // And an existing cached query pool is left alone.
    let _query = manager.query_pool().unwrap();
    assert!(manager.has_cached_pool());
    let _migration_again = manager.migration_pool().unwrap();
    assert!(manager.has_cached_pool());
}

#[test]
fn invalid_url_fails_the_load_naming_the_variable() {
    let mut vars = dev_vars();
    vars[0].1 = "not-a-url".to_string();

    let err = AppConfig::from_vars(vars).unwrap_err();
    assert!(err.to_string().contains("DATABASE_URL"));
}

#[test]
fn loader_failure_blocks_client_construction() {
    // The usual bootstrap sequence: load, then build the manager. A failed
    // load means there is no configuration to hand to ClientManager at all.
    let result = AppConfig::from_vars(Vec::new());
    assert!(result.is_err());
}
