use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    models::{ConnectionSpec, Dialect, QueryColumn, TableInfo},
    HubResult,
};

/// 外部数据源连接池参数
#[derive(Debug, Clone)]
pub struct DataStorePoolOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

impl Default for DataStorePoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 8,
            min_connections: 0,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

/// 外部数据源驱动，负责建立连接池
#[async_trait]
pub trait DataStoreDriver: Send + Sync {
    async fn open(
        &self,
        spec: &ConnectionSpec,
        options: &DataStorePoolOptions,
    ) -> HubResult<Arc<dyn DataStorePool>>;
}

/// 一个已建立的外部数据源连接池
#[async_trait]
pub trait DataStorePool: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// 轻量存活探测
    async fn ping(&self) -> HubResult<()>;

    async fn databases(&self) -> HubResult<Vec<String>>;

    /// 列出库下的表与视图，`column_type` 为 TABLE 或 VIEW
    async fn tables(&self, database: &str) -> HubResult<Vec<QueryColumn>>;

    async fn columns(&self, database: &str, table: &str) -> HubResult<TableInfo>;

    async fn table_exists(&self, table: &str) -> HubResult<bool>;

    /// 执行一条带文本参数的语句，返回受影响行数
    async fn execute(&self, sql: &str, params: &[Option<String>]) -> HubResult<u64>;

    async fn close(&self);
}
