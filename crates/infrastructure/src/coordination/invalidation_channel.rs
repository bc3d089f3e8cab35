use futures::StreamExt;
use hub_core::{
    models::{HandlerKind, InvalidationMessage},
    traits::{CoordinationStore, InvalidationHandler},
    HubResult,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::observability::{MetricsCollector, StructuredLogger};

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// 集群失效通知通道
///
/// 集群模式下消息经协调存储广播给所有节点（包括发送方），由订阅循环分发给本地处理器。
/// 单节点模式下不创建通道，调用方直接在本进程内同步处理。
pub struct InvalidationChannel {
    store: Arc<dyn CoordinationStore>,
    channel: String,
    node_id: String,
    handlers: RwLock<HashMap<HandlerKind, Arc<dyn InvalidationHandler>>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl InvalidationChannel {
    pub fn new(store: Arc<dyn CoordinationStore>, channel: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            store,
            channel: channel.into(),
            node_id: node_id.into(),
            handlers: RwLock::new(HashMap::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn register_handler(&self, handler: Arc<dyn InvalidationHandler>) {
        if let Ok(mut handlers) = self.handlers.write() {
            info!("注册失效消息处理器: {}", handler.kind());
            handlers.insert(handler.kind(), handler);
        }
    }

    /// 广播消息，不等待任何订阅方处理
    ///
    /// 协调存储不可达时返回 `CoordinationUnavailable`，由调用方决定是否在本地处理。
    pub async fn publish(&self, handler: HandlerKind, payload: impl Into<String>) -> HubResult<String> {
        let message = InvalidationMessage::new(handler, payload, self.node_id.clone());
        let raw = message.to_json()?;
        self.store.publish(&self.channel, &raw).await?;

        if let Some(metrics) = &self.metrics {
            metrics.record_invalidation_published();
        }
        StructuredLogger::log_invalidation(
            handler.as_str(),
            &message.correlation_id,
            &self.node_id,
            true,
        );
        Ok(message.correlation_id)
    }

    /// 将一条消息分发给本地处理器，处理失败只记录日志
    pub async fn dispatch(&self, message: &InvalidationMessage) {
        if let Some(metrics) = &self.metrics {
            metrics.record_invalidation_received();
        }
        StructuredLogger::log_invalidation(
            message.handler.as_str(),
            &message.correlation_id,
            &message.origin,
            false,
        );

        let handler = match self.handlers.read() {
            Ok(handlers) => handlers.get(&message.handler).cloned(),
            Err(_) => None,
        };

        match handler {
            Some(handler) => {
                if let Err(e) = handler.handle(message).await {
                    error!(
                        "处理失效消息失败: handler={}, correlation_id={}, error={}",
                        message.handler, message.correlation_id, e
                    );
                }
            }
            None => warn!("没有注册的失效消息处理器: {}", message.handler),
        }
    }

    async fn dispatch_raw(&self, raw: &str) {
        match InvalidationMessage::from_json(raw) {
            Ok(message) => self.dispatch(&message).await,
            Err(e) => warn!("忽略无法解析的失效消息: {}", e),
        }
    }

    /// 订阅一次并返回订阅流，供监听循环与测试使用
    async fn subscribe(&self) -> HubResult<futures::stream::BoxStream<'static, String>> {
        self.store.subscribe(&self.channel).await
    }

    /// 启动订阅监听循环
    ///
    /// 订阅断开后按固定间隔重新订阅，收到关闭信号后退出。
    pub fn start_listener(self: &Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let channel = Arc::clone(self);
        tokio::spawn(async move {
            info!("失效通知监听启动: channel={}, node={}", channel.channel, channel.node_id);
            loop {
                let mut stream = match channel.subscribe().await {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!("订阅失效通知失败，{}秒后重试: {}", RESUBSCRIBE_DELAY.as_secs(), e);
                        tokio::select! {
                            _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => continue,
                            _ = shutdown_rx.recv() => break,
                        }
                    }
                };

                loop {
                    tokio::select! {
                        next = stream.next() => match next {
                            Some(raw) => channel.dispatch_raw(&raw).await,
                            None => {
                                warn!("失效通知订阅已断开，准备重新订阅");
                                break;
                            }
                        },
                        _ = shutdown_rx.recv() => {
                            info!("失效通知监听收到关闭信号");
                            return;
                        }
                    }
                }
            }
            debug!("失效通知监听退出");
        })
    }
}
