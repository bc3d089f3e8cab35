use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use hub_core::{traits::CoordinationStore, HubError, HubResult};
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// 仅当值匹配时删除，保证只释放自己持有的锁
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// 基于Redis的协调存储
///
/// 连接延迟建立，Redis不可达时所有操作返回 `CoordinationUnavailable`。
pub struct RedisCoordinationStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    op_timeout: Duration,
}

impl RedisCoordinationStore {
    pub fn new(redis_url: &str) -> HubResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| HubError::coordination(format!("Failed to create Redis client: {e}")))?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
            op_timeout: Duration::from_secs(3),
        })
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    async fn connection(&self) -> HubResult<ConnectionManager> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                let conn = tokio::time::timeout(self.op_timeout, self.client.get_connection_manager())
                    .await
                    .map_err(|_| HubError::coordination("Redis connection timed out"))?
                    .map_err(|e| HubError::coordination(format!("Failed to connect to Redis: {e}")))?;
                debug!("Successfully connected to Redis coordination store");
                Ok::<_, HubError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }

    async fn run<T, F>(&self, op: &str, fut: F) -> HubResult<T>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("Redis {} failed: {}", op, e);
                Err(HubError::coordination(format!("Redis {op} failed: {e}")))
            }
            Err(_) => {
                warn!("Redis {} timed out", op);
                Err(HubError::coordination(format!("Redis {op} timed out")))
            }
        }
    }

    pub async fn ping(&self) -> HubResult<()> {
        let mut conn = self.connection().await?;
        let response: String = self
            .run("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        if response == "PONG" {
            Ok(())
        } else {
            Err(HubError::coordination(format!("Unexpected PING response: {response}")))
        }
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> HubResult<bool> {
        let mut conn = self.connection().await?;
        let ttl_ms = ttl.as_millis().max(1) as u64;
        let reply: Option<String> = self
            .run(
                "SET NX",
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_ms)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn delete_if_match(&self, key: &str, value: &str) -> HubResult<bool> {
        let mut conn = self.connection().await?;
        let script = Script::new(COMPARE_AND_DELETE);
        let deleted: i64 = self
            .run(
                "compare-and-delete",
                script.key(key).arg(value).invoke_async(&mut conn),
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn publish(&self, channel: &str, payload: &str) -> HubResult<()> {
        let mut conn = self.connection().await?;
        let receivers: i64 = self
            .run(
                "PUBLISH",
                redis::cmd("PUBLISH").arg(channel).arg(payload).query_async(&mut conn),
            )
            .await?;
        debug!("Published to {} ({} receivers)", channel, receivers);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> HubResult<BoxStream<'static, String>> {
        let mut pubsub = tokio::time::timeout(self.op_timeout, self.client.get_async_pubsub())
            .await
            .map_err(|_| HubError::coordination("Redis pubsub connection timed out"))?
            .map_err(|e| HubError::coordination(format!("Failed to open Redis pubsub: {e}")))?;

        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| HubError::coordination(format!("Failed to subscribe {channel}: {e}")))?;

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!("Dropping non-text pubsub payload: {}", e);
                        None
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
    async fn test_unreachable_redis_is_coordination_unavailable() {
        let store = RedisCoordinationStore::new("redis://127.0.0.1:1")
            .unwrap()
            .with_op_timeout(Duration::from_millis(500));

        let err = store
            .set_if_absent("k", "v", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::CoordinationUnavailable(_)));

        let err = store.publish("c", "p").await.unwrap_err();
        assert!(matches!(err, HubError::CoordinationUnavailable(_)));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(RedisCoordinationStore::new("not-a-url").is_err());
    }
}
