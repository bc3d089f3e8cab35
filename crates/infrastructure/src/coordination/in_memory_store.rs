use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use hub_core::{traits::CoordinationStore, HubError, HubResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
struct StoreState {
    keys: HashMap<String, (String, Instant)>,
    channels: HashMap<String, broadcast::Sender<String>>,
}

/// 进程内协调存储
///
/// 单节点模式下提供同一进程内的互斥与通知；多个 `clone` 共享同一份状态，
/// 可以在测试中模拟多个节点连接同一个协调存储。
#[derive(Clone)]
pub struct InMemoryCoordinationStore {
    state: Arc<Mutex<StoreState>>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// 模拟存储不可达
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> HubResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(HubError::coordination("in-memory coordination store is offline"))
        }
    }

    fn lock_state(&self) -> HubResult<std::sync::MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| HubError::internal("coordination state lock poisoned"))
    }

    /// 当前未过期的键值，主要用于测试断言
    pub fn get(&self, key: &str) -> Option<String> {
        let state = self.state.lock().ok()?;
        state
            .keys
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone())
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> HubResult<bool> {
        self.check_available()?;
        let mut state = self.lock_state()?;
        let now = Instant::now();

        if let Some((_, expires_at)) = state.keys.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }

        state.keys.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(true)
    }

    async fn delete_if_match(&self, key: &str, value: &str) -> HubResult<bool> {
        self.check_available()?;
        let mut state = self.lock_state()?;
        let now = Instant::now();

        let matches = matches!(
            state.keys.get(key),
            Some((current, expires_at)) if current == value && *expires_at > now
        );
        if matches {
            state.keys.remove(key);
        }
        Ok(matches)
    }

    async fn publish(&self, channel: &str, payload: &str) -> HubResult<()> {
        self.check_available()?;
        let state = self.lock_state()?;
        if let Some(sender) = state.channels.get(channel) {
            let receivers = sender.send(payload.to_string()).unwrap_or(0);
            debug!("Published to {} ({} receivers)", channel, receivers);
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> HubResult<BoxStream<'static, String>> {
        self.check_available()?;
        let receiver = {
            let mut state = self.lock_state()?;
            state
                .channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe()
        };

        let stream = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => return Some((payload, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Subscriber lagged, {} messages skipped", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_respects_ttl() {
        let store = InMemoryCoordinationStore::new();
        assert!(store.set_if_absent("k", "a", Duration::from_millis(50)).await.unwrap());
        assert!(!store.set_if_absent("k", "b", Duration::from_millis(50)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.set_if_absent("k", "b", Duration::from_secs(1)).await.unwrap());
        assert_eq!(store.get("k").as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_delete_if_match_only_for_owner() {
        let store = InMemoryCoordinationStore::new();
        store.set_if_absent("k", "owner", Duration::from_secs(1)).await.unwrap();

        assert!(!store.delete_if_match("k", "other").await.unwrap());
        assert!(store.delete_if_match("k", "owner").await.unwrap());
        assert!(store.get("k").is_none());
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let store = InMemoryCoordinationStore::new();
        let mut first = store.subscribe("topic").await.unwrap();
        let mut second = store.clone().subscribe("topic").await.unwrap();

        store.publish("topic", "hello").await.unwrap();

        assert_eq!(first.next().await.as_deref(), Some("hello"));
        assert_eq!(second.next().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_offline_store_reports_unavailable() {
        let store = InMemoryCoordinationStore::new();
        store.set_available(false);
        let err = store
            .set_if_absent("k", "v", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::CoordinationUnavailable(_)));
        assert!(store.publish("topic", "x").await.is_err());
    }
}
