//! 元数据仓储接口
//!
//! - `DataSourceRepository` - 数据源配置的CRUD
//! - `CronJobRepository` - 定时任务定义及状态的CRUD
//!
//! 名称唯一性由调用方通过"检查 → 加锁 → 复查 → 写入"保证，
//! 仓储层只负责原子的单条记录读写。

use async_trait::async_trait;

use crate::{
    models::{CronJob, DataSourceConfig, JobStatus},
    HubResult,
};

#[async_trait]
pub trait DataSourceRepository: Send + Sync {
    /// 插入记录，返回带有分配ID的数据源
    async fn create(&self, source: &DataSourceConfig) -> HubResult<DataSourceConfig>;

    async fn get_by_id(&self, id: i64) -> HubResult<Option<DataSourceConfig>>;

    async fn find_by_name(&self, project_id: i64, name: &str) -> HubResult<Option<DataSourceConfig>>;

    async fn list_by_project(&self, project_id: i64) -> HubResult<Vec<DataSourceConfig>>;

    async fn update(&self, source: &DataSourceConfig) -> HubResult<()>;

    async fn delete(&self, id: i64) -> HubResult<()>;
}

#[async_trait]
pub trait CronJobRepository: Send + Sync {
    async fn create(&self, job: &CronJob) -> HubResult<CronJob>;

    async fn get_by_id(&self, id: i64) -> HubResult<Option<CronJob>>;

    async fn find_by_name(&self, project_id: i64, name: &str) -> HubResult<Option<CronJob>>;

    async fn list_by_project(&self, project_id: i64) -> HubResult<Vec<CronJob>>;

    async fn list_by_status(&self, status: JobStatus) -> HubResult<Vec<CronJob>>;

    async fn update(&self, job: &CronJob) -> HubResult<()>;

    /// 只更新状态与失败原因
    async fn update_status(
        &self,
        id: i64,
        status: JobStatus,
        failure_reason: Option<&str>,
        updated_by: i64,
    ) -> HubResult<()>;

    async fn delete(&self, id: i64) -> HubResult<()>;
}
