use async_trait::async_trait;
use hub_core::{models::CronJob, models::JobType, traits::JobPayloadExecutor, HubResult};
use hub_dispatcher::ExecutorRegistry;
use tracing::info;

/// 只记录载荷的执行器
///
/// 邮件与群聊通知的实际投递由外部服务负责，独立运行时用它占位，
/// 保证触发链路完整可观测。嵌入方应注册自己的执行器替换。
pub struct LoggingExecutor {
    job_type: JobType,
}

impl LoggingExecutor {
    pub fn new(job_type: JobType) -> Self {
        Self { job_type }
    }
}

#[async_trait]
impl JobPayloadExecutor for LoggingExecutor {
    fn job_type(&self) -> JobType {
        self.job_type.clone()
    }

    async fn execute(&self, job: &CronJob) -> HubResult<()> {
        info!(
            job_id = job.id,
            project_id = job.project_id,
            job_type = %self.job_type,
            "执行定时任务 {}，载荷: {}",
            job.name,
            job.config
        );
        Ok(())
    }
}

/// 独立运行时的默认执行器集合
pub fn default_executors() -> ExecutorRegistry {
    ExecutorRegistry::new()
        .with(std::sync::Arc::new(LoggingExecutor::new(JobType::Email)))
        .with(std::sync::Arc::new(LoggingExecutor::new(JobType::ChatNotify)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_executors_cover_known_types() {
        let registry = default_executors();
        assert!(registry.supports(&JobType::Email));
        assert!(registry.supports(&JobType::ChatNotify));
        assert!(!registry.supports(&JobType::Unknown("sms".to_string())));
    }
}
