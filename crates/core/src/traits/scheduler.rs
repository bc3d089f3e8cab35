use async_trait::async_trait;

use crate::{models::CronJob, HubResult};

/// 触发器管理
#[async_trait]
pub trait TriggerScheduler: Send + Sync {
    /// 注册触发器，已存在时替换
    async fn add_job(&self, job: &CronJob) -> HubResult<()>;

    /// 先移除再注册
    async fn modify_job(&self, job: &CronJob) -> HubResult<()>;

    /// 移除触发器，不存在时不报错
    async fn remove_job(&self, job_id: i64) -> HubResult<()>;

    async fn contains(&self, job_id: i64) -> bool;
}

/// 触发回调，只负责投递，不在调用线程上执行任务
pub trait FireHandler: Send + Sync {
    fn on_fire(&self, job: &CronJob);
}
