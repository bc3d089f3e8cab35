use futures::future::join_all;
use hub_core::models::{ConnectionParams, ConnectionSpec};
use hub_core::traits::DataStorePoolOptions;
use hub_registry::ConnectionPoolRegistry;
use hub_testing_utils::MockDataStoreDriver;
use std::sync::Arc;
use std::time::Duration;

fn params(url: &str, password: &str) -> ConnectionParams {
    ConnectionParams {
        url: url.to_string(),
        username: "reader".to_string(),
        password: password.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_concurrent_acquire_creates_single_pool() {
    let driver = Arc::new(MockDataStoreDriver::new().with_delay(Duration::from_millis(30)));
    let registry = Arc::new(ConnectionPoolRegistry::new(driver.clone(), DataStorePoolOptions::default()));
    let spec = ConnectionSpec::new("1@pg1", &params("jdbc:postgresql://h/db", "p"));

    let tasks = (0..16).map(|_| {
        let registry = registry.clone();
        let spec = spec.clone();
        tokio::spawn(async move { registry.acquire(&spec).await.map(|h| h.fingerprint().clone()) })
    });
    let results = join_all(tasks).await;

    for result in results {
        assert_eq!(result.unwrap().unwrap(), spec.fingerprint());
    }
    assert_eq!(driver.open_count(), 1);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_distinct_credentials_get_distinct_pools() {
    let driver = Arc::new(MockDataStoreDriver::new());
    let registry = ConnectionPoolRegistry::new(driver.clone(), DataStorePoolOptions::default());

    let a = ConnectionSpec::new("1@pg1", &params("jdbc:postgresql://h/db", "old"));
    let b = ConnectionSpec::new("1@pg1", &params("jdbc:postgresql://h/db", "new"));
    registry.acquire(&a).await.unwrap();
    registry.acquire(&b).await.unwrap();
    registry.acquire(&a).await.unwrap();

    assert_eq!(driver.open_count(), 2);
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_release_then_acquire_recreates() {
    let driver = Arc::new(MockDataStoreDriver::new());
    let registry = ConnectionPoolRegistry::new(driver.clone(), DataStorePoolOptions::default());
    let spec = ConnectionSpec::new("2@my", &params("jdbc:mysql://h:3306/db", "p"));

    assert!(!registry.release(&spec).await);
    registry.acquire(&spec).await.unwrap();
    assert!(registry.release(&spec).await);
    assert!(registry.is_empty());
    assert_eq!(driver.closed_count(), 1);

    registry.acquire(&spec).await.unwrap();
    assert_eq!(driver.open_count(), 2);
}

#[tokio::test]
async fn test_connection_probe() {
    let driver = Arc::new(MockDataStoreDriver::new());
    let registry = ConnectionPoolRegistry::new(driver.clone(), DataStorePoolOptions::default());
    let spec = ConnectionSpec::new("1@pg1", &params("jdbc:postgresql://h/db", "p"));
    assert!(registry.test_connection(&spec).await.unwrap());

    let broken = Arc::new(MockDataStoreDriver::new().with_ping_failure());
    let registry = ConnectionPoolRegistry::new(broken, DataStorePoolOptions::default());
    assert!(!registry.test_connection(&spec).await.unwrap());
}

#[tokio::test]
async fn test_close_all() {
    let driver = Arc::new(MockDataStoreDriver::new());
    let registry = ConnectionPoolRegistry::new(driver.clone(), DataStorePoolOptions::default());
    for i in 0..3 {
        let spec = ConnectionSpec::new(format!("{i}@s"), &params("jdbc:postgresql://h/db", "p"));
        registry.acquire(&spec).await.unwrap();
    }
    registry.close_all().await;
    assert!(registry.is_empty());
    assert_eq!(driver.closed_count(), 3);
}
