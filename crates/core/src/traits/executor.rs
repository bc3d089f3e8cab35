use async_trait::async_trait;

use crate::{
    models::{CronJob, JobType},
    HubResult,
};

/// 任务载荷执行器（邮件、群聊通知等），由外部协作方实现
#[async_trait]
pub trait JobPayloadExecutor: Send + Sync {
    fn job_type(&self) -> JobType;

    async fn execute(&self, job: &CronJob) -> HubResult<()>;
}
