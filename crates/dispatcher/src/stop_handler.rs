use std::sync::Arc;

use async_trait::async_trait;
use hub_core::{
    models::{HandlerKind, InvalidationMessage},
    traits::{InvalidationHandler, TriggerScheduler},
    HubError, HubResult,
};
use tracing::info;

/// 收到任务停止通知后移除本节点上的触发器
pub struct CronJobStopHandler {
    scheduler: Arc<dyn TriggerScheduler>,
}

impl CronJobStopHandler {
    pub fn new(scheduler: Arc<dyn TriggerScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl InvalidationHandler for CronJobStopHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::CronJobStop
    }

    async fn handle(&self, message: &InvalidationMessage) -> HubResult<()> {
        let job_id: i64 = message
            .payload
            .trim()
            .parse()
            .map_err(|_| HubError::validation(format!("无效的任务ID: {}", message.payload)))?;

        if self.scheduler.contains(job_id).await {
            info!("收到停止通知，移除任务 {} 的触发器 (来自 {})", job_id, message.origin);
        }
        self.scheduler.remove_job(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_testing_utils::MockTriggerScheduler;

    #[tokio::test]
    async fn test_stop_message_removes_trigger() {
        let scheduler = Arc::new(MockTriggerScheduler::new());
        scheduler.add_job(&hub_testing_utils::CronJobBuilder::new().with_id(12).build()).await.unwrap();
        let handler = CronJobStopHandler::new(scheduler.clone());

        handler
            .handle(&InvalidationMessage::new(HandlerKind::CronJobStop, "12", "node-a"))
            .await
            .unwrap();
        assert!(!scheduler.contains(12).await);

        let err = handler
            .handle(&InvalidationMessage::new(HandlerKind::CronJobStop, "abc", "node-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));
    }
}
