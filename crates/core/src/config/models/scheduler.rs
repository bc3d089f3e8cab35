use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 任务执行分发配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub execution_timeout_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 256,
            execution_timeout_seconds: 300,
        }
    }
}

impl SchedulerConfig {
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_count == 0 {
            return Err(anyhow::anyhow!("执行线程数必须大于0"));
        }

        if self.queue_capacity == 0 {
            return Err(anyhow::anyhow!("执行队列容量必须大于0"));
        }

        if self.execution_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("任务执行超时时间必须大于0"));
        }

        Ok(())
    }
}
