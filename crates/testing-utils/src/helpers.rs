//! 测试辅助工具

use hub_core::security::CredentialCodec;
use std::time::Duration;
use tokio::time::sleep;

/// 测试环境工具
pub struct TestEnv;

impl TestEnv {
    /// 在超时前轮询等待条件成立
    ///
    /// 集群通知等异步副作用的断言需要等待监听循环处理完消息。
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }
        condition().await
    }

    /// 固定密钥的凭据编码器
    pub fn codec() -> CredentialCodec {
        CredentialCodec::new(*b"0123456789abcdef0123456789abcdef")
    }

    /// 为测试二进制初始化一次日志
    pub fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_success() {
        let mut counter = 0;
        let condition = || {
            counter += 1;
            let done = counter >= 3;
            async move { done }
        };
        assert!(TestEnv::wait_for(condition, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn test_wait_for_timeout() {
        let result = TestEnv::wait_for(|| async { false }, Duration::from_millis(100)).await;
        assert!(!result);
    }

    #[test]
    fn test_codec_round_trip() {
        let codec = TestEnv::codec();
        let secret = codec.encrypt("p").unwrap();
        assert_eq!(codec.decrypt(&secret), "p");
    }
}
