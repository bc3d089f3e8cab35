use async_trait::async_trait;
use hub_core::{
    models::{HandlerKind, InvalidationMessage},
    security::Fingerprint,
    traits::InvalidationHandler,
    HubResult,
};
use std::sync::Arc;
use tracing::debug;

use crate::ConnectionPoolRegistry;

/// 收到数据源释放通知后移除本节点上对应指纹的连接池
pub struct SourceReleaseHandler {
    registry: Arc<ConnectionPoolRegistry>,
}

impl SourceReleaseHandler {
    pub fn new(registry: Arc<ConnectionPoolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl InvalidationHandler for SourceReleaseHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::SourceRelease
    }

    async fn handle(&self, message: &InvalidationMessage) -> HubResult<()> {
        let fingerprint = Fingerprint::from_hex(message.payload.trim());
        let released = self.registry.release_fingerprint(&fingerprint).await;
        debug!(
            "处理数据源释放通知: fingerprint={}, released={}, origin={}",
            fingerprint.short(),
            released,
            message.origin
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::{models::ConnectionParams, models::ConnectionSpec, traits::DataStorePoolOptions};
    use hub_testing_utils::MockDataStoreDriver;

    #[tokio::test]
    async fn test_release_message_evicts_pool() {
        let driver = Arc::new(MockDataStoreDriver::new());
        let registry = Arc::new(ConnectionPoolRegistry::new(driver.clone(), DataStorePoolOptions::default()));
        let spec = ConnectionSpec::new(
            "3@mysql",
            &ConnectionParams {
                url: "jdbc:mysql://h:3306/db".to_string(),
                username: "root".to_string(),
                password: "pw".to_string(),
                ..Default::default()
            },
        );
        registry.acquire(&spec).await.unwrap();
        assert!(registry.contains(&spec.fingerprint()));

        let handler = SourceReleaseHandler::new(registry.clone());
        let message = InvalidationMessage::new(HandlerKind::SourceRelease, spec.fingerprint().as_str(), "node-b");
        handler.handle(&message).await.unwrap();

        assert!(!registry.contains(&spec.fingerprint()));
        assert_eq!(driver.closed_count(), 1);

        // 重复消息不影响
        handler.handle(&message).await.unwrap();
        assert_eq!(driver.closed_count(), 1);
    }
}
