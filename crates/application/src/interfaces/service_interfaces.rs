use async_trait::async_trait;

use hub_core::{
    models::{
        Actor, ConnectionParams, CronJob, CronJobCreate, CronJobUpdate, DataSourceConfig, QueryColumn,
        SourceCreate, SourceDetail, SourceUpdate, TableInfo, UploadMode, UploadRequest, UploadRow,
    },
    HubResult,
};
use hub_dispatcher::DispatchOutcome;

pub mod source_services {
    use super::*;

    /// 数据源管理
    #[async_trait]
    pub trait SourceService: Send + Sync {
        async fn create_source(&self, actor: &Actor, request: SourceCreate) -> HubResult<DataSourceConfig>;
        async fn update_source(&self, actor: &Actor, request: SourceUpdate) -> HubResult<DataSourceConfig>;
        async fn delete_source(&self, actor: &Actor, id: i64) -> HubResult<()>;
        async fn get_source_detail(&self, actor: &Actor, id: i64) -> HubResult<SourceDetail>;
        async fn list_sources(&self, actor: &Actor, project_id: i64) -> HubResult<Vec<SourceDetail>>;
    }

    /// 连接测试与重连
    #[async_trait]
    pub trait SourceConnectionService: Send + Sync {
        /// 测试已保存的数据源
        async fn test_connection(&self, actor: &Actor, id: i64) -> HubResult<bool>;
        /// 测试未保存的连接参数，不可达时返回 `ConnectivityFailure`
        async fn test_source(&self, actor: &Actor, project_id: i64, params: ConnectionParams) -> HubResult<()>;
        async fn reconnect(&self, actor: &Actor, id: i64, db_user: &str, db_password: &str) -> HubResult<bool>;
    }

    /// 元数据读取
    #[async_trait]
    pub trait SourceMetadataService: Send + Sync {
        async fn get_databases(&self, actor: &Actor, id: i64) -> HubResult<Vec<String>>;
        async fn get_tables(&self, actor: &Actor, id: i64, database: &str) -> HubResult<Vec<QueryColumn>>;
        async fn get_columns(&self, actor: &Actor, id: i64, database: &str, table: &str) -> HubResult<TableInfo>;
    }

    /// 外部文件解析结果写入
    #[async_trait]
    pub trait SourceUploadService: Send + Sync {
        async fn validate_upload(&self, actor: &Actor, id: i64, table: &str, mode: UploadMode) -> HubResult<()>;
        /// 返回写入的行数
        async fn upload_rows(
            &self,
            actor: &Actor,
            id: i64,
            request: UploadRequest,
            rows: Vec<UploadRow>,
        ) -> HubResult<u64>;
    }
}

pub mod cron_job_services {
    use super::*;

    /// 定时任务定义管理
    #[async_trait]
    pub trait CronJobService: Send + Sync {
        async fn create_job(&self, actor: &Actor, request: CronJobCreate) -> HubResult<CronJob>;
        async fn update_job(&self, actor: &Actor, request: CronJobUpdate) -> HubResult<CronJob>;
        async fn delete_job(&self, actor: &Actor, id: i64) -> HubResult<()>;
        async fn get_job(&self, actor: &Actor, id: i64) -> HubResult<CronJob>;
        async fn list_jobs(&self, actor: &Actor, project_id: i64) -> HubResult<Vec<CronJob>>;
    }

    /// 定时任务状态控制
    #[async_trait]
    pub trait CronJobControlService: Send + Sync {
        async fn start_job(&self, actor: &Actor, id: i64) -> HubResult<CronJob>;
        async fn stop_job(&self, actor: &Actor, id: i64) -> HubResult<CronJob>;
        /// 立即投递一次，窗口外或类型未知时不执行但返回成功
        async fn execute_job_now(&self, actor: &Actor, id: i64) -> HubResult<DispatchOutcome>;
    }
}

pub use cron_job_services::*;
pub use source_services::*;
