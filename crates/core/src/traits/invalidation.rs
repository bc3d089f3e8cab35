use async_trait::async_trait;

use crate::{
    models::{HandlerKind, InvalidationMessage},
    HubResult,
};

/// 集群失效消息的本地处理器
#[async_trait]
pub trait InvalidationHandler: Send + Sync {
    fn kind(&self) -> HandlerKind;

    async fn handle(&self, message: &InvalidationMessage) -> HubResult<()>;
}
