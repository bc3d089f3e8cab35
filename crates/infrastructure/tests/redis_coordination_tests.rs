//! Redis 协调存储集成测试，需要 Docker 环境：
//! `cargo test -p hub-infrastructure --test redis_coordination_tests -- --ignored`

use futures::StreamExt;
use hub_core::{models::EntityKind, traits::CoordinationStore};
use hub_infrastructure::{DistributedNameLock, LockOutcome, RedisCoordinationStore};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::redis::Redis;

async fn start_redis() -> (ContainerAsync<Redis>, RedisCoordinationStore) {
    let container = Redis::default().start().await.unwrap();
    let port = container.get_host_port_ipv4(6379).await.unwrap();
    let store = RedisCoordinationStore::new(&format!("redis://127.0.0.1:{port}")).unwrap();
    (container, store)
}

#[tokio::test]
#[ignore]
async fn test_redis_set_if_absent_and_compare_delete() {
    let (_container, store) = start_redis().await;

    assert!(store.set_if_absent("k", "a", Duration::from_secs(5)).await.unwrap());
    assert!(!store.set_if_absent("k", "b", Duration::from_secs(5)).await.unwrap());
    assert!(!store.delete_if_match("k", "b").await.unwrap());
    assert!(store.delete_if_match("k", "a").await.unwrap());
    assert!(store.set_if_absent("k", "b", Duration::from_secs(5)).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_redis_lock_grants_single_holder_under_race() {
    let (_container, store) = start_redis().await;
    let lock = DistributedNameLock::new(Arc::new(store), "hub:");

    let attempts = (0..16).map(|_| {
        let lock = lock.clone();
        tokio::spawn(async move {
            lock.acquire_name(EntityKind::Source, "pg1", 1, Duration::from_secs(10))
                .await
        })
    });
    let outcomes = futures::future::join_all(attempts).await;
    let locked = outcomes
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|o| matches!(o, LockOutcome::Locked(_)))
        .count();
    assert_eq!(locked, 1);
}

#[tokio::test]
#[ignore]
async fn test_redis_pubsub_delivers_messages() {
    let (_container, store) = start_redis().await;
    let mut stream = store.subscribe("hub:topic").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    store.publish("hub:topic", "payload").await.unwrap();
    let received = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap();
    assert_eq!(received.as_deref(), Some("payload"));
}
