use std::collections::HashMap;
use std::sync::Arc;

use hub_core::{models::JobType, traits::JobPayloadExecutor};
use tracing::info;

/// 按任务类型索引的载荷执行器
///
/// 启动装配阶段注册，之后只读。
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<JobType, Arc<dyn JobPayloadExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, executor: Arc<dyn JobPayloadExecutor>) -> &mut Self {
        let job_type = executor.job_type();
        info!("注册任务执行器: {}", job_type);
        self.executors.insert(job_type, executor);
        self
    }

    pub fn with(mut self, executor: Arc<dyn JobPayloadExecutor>) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, job_type: &JobType) -> Option<Arc<dyn JobPayloadExecutor>> {
        self.executors.get(job_type).cloned()
    }

    pub fn supports(&self, job_type: &JobType) -> bool {
        self.executors.contains_key(job_type)
    }

    pub fn job_types(&self) -> Vec<JobType> {
        self.executors.keys().cloned().collect()
    }
}
