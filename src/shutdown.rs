use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// 进程退出时等待各组件收尾的上限
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// 优雅关闭管理器
///
/// 关闭信号只发送一次；关闭之后才订阅的接收器会立即收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    sender: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            sender,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        let rx = self.sender.subscribe();
        if self.is_shutdown() {
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(());
            return rx;
        }
        rx
    }

    pub fn shutdown(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            debug!("关闭管理器已经触发过关闭");
            return;
        }
        info!("发送关闭信号给 {} 个订阅者", self.sender.receiver_count());
        let _ = self.sender.send(());
    }

    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// 等待 Ctrl+C 或 SIGTERM 后触发关闭
    pub async fn shutdown_on_signal(&self) {
        wait_for_signal().await;
        self.shutdown();
    }

    /// 在宽限期内等待收尾任务结束，返回是否按时完成
    pub async fn drain<F>(&self, cleanup: F, grace: Duration) -> bool
    where
        F: Future,
    {
        match tokio::time::timeout(grace, cleanup).await {
            Ok(_) => true,
            Err(_) => {
                warn!("收尾超过 {} 秒，强制退出", grace.as_secs());
                false
            }
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到Ctrl+C信号"),
        _ = terminate => info!("收到SIGTERM信号"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_every_subscriber_sees_shutdown_once() {
        let manager = ShutdownManager::new();
        let mut early = manager.subscribe();
        let clone = manager.clone();

        manager.shutdown();
        clone.shutdown();

        assert!(timeout(Duration::from_millis(100), early.recv()).await.is_ok());
        assert!(early.try_recv().is_err());
        assert!(clone.is_shutdown());

        let mut late = manager.subscribe();
        assert!(timeout(Duration::from_millis(100), late.recv()).await.is_ok());
    }

    #[tokio::test]
    async fn test_drain_respects_grace_period() {
        let manager = ShutdownManager::new();
        assert!(manager.drain(async {}, Duration::from_millis(50)).await);
        assert!(
            !manager
                .drain(tokio::time::sleep(Duration::from_secs(1)), Duration::from_millis(50))
                .await
        );
    }
}
