use std::sync::Arc;

use hub_core::{models::HandlerKind, security::Fingerprint, traits::TriggerScheduler, HubResult};
use hub_infrastructure::InvalidationChannel;
use hub_registry::ConnectionPoolRegistry;
use tracing::{info, warn};

/// 释放与停止的传播方式
///
/// 集群模式下广播给所有节点（含本节点），由各节点的处理器完成；
/// 单节点模式或广播失败时在本进程内同步完成。
#[derive(Clone)]
pub enum InvalidationMode {
    Local,
    Cluster(Arc<InvalidationChannel>),
}

impl InvalidationMode {
    pub fn is_cluster(&self) -> bool {
        matches!(self, InvalidationMode::Cluster(_))
    }

    /// 释放指纹对应的连接池
    pub async fn release_source(&self, registry: &ConnectionPoolRegistry, fingerprint: &Fingerprint) {
        if let InvalidationMode::Cluster(channel) = self {
            match channel.publish(HandlerKind::SourceRelease, fingerprint.as_str()).await {
                Ok(correlation_id) => {
                    info!("已广播数据源释放: {} ({})", fingerprint.short(), correlation_id);
                    return;
                }
                Err(e) => warn!("广播数据源释放失败，仅释放本节点: {}", e),
            }
        }
        registry.release_fingerprint(fingerprint).await;
    }

    /// 停止任务触发器
    ///
    /// 本地移除失败时返回错误，由调用方记录 FAILED。
    pub async fn stop_job(&self, scheduler: &dyn TriggerScheduler, job_id: i64) -> HubResult<()> {
        if let InvalidationMode::Cluster(channel) = self {
            match channel.publish(HandlerKind::CronJobStop, job_id.to_string()).await {
                Ok(correlation_id) => {
                    info!("已广播任务停止: {} ({})", job_id, correlation_id);
                    return Ok(());
                }
                Err(e) => warn!("广播任务停止失败，仅停止本节点触发器: {}", e),
            }
        }
        scheduler.remove_job(job_id).await
    }
}
