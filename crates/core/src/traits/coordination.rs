use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

use crate::HubResult;

/// 集群协调存储
///
/// 提供带过期时间的原子占位与主题发布订阅。实现在存储不可达时
/// 返回 `HubError::CoordinationUnavailable`。
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// 键不存在时写入并设置过期时间，返回是否写入成功
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> HubResult<bool>;

    /// 仅当键的当前值等于 `value` 时删除，返回是否删除
    async fn delete_if_match(&self, key: &str, value: &str) -> HubResult<bool>;

    /// 向主题发布消息，不等待订阅方处理
    async fn publish(&self, channel: &str, payload: &str) -> HubResult<()>;

    /// 订阅主题，流结束表示订阅连接断开
    async fn subscribe(&self, channel: &str) -> HubResult<BoxStream<'static, String>>;
}
