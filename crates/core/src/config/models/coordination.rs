use serde::{Deserialize, Serialize};

/// 协调存储不可用时名称锁的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockFallback {
    /// 按单节点模式继续写入，并记录警告
    #[default]
    Proceed,
    /// 拒绝写入，返回协调服务不可用
    Reject,
}

/// 集群协调配置（分布式锁与失效通知）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// 为 false 时以单节点模式运行，释放与停止在本进程内同步完成
    pub enabled: bool,
    pub redis_url: String,
    pub channel: String,
    pub lock_ttl_seconds: u64,
    pub recovery_lock_ttl_seconds: u64,
    pub lock_fallback: LockFallback,
    pub key_prefix: String,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            channel: "hub:topic".to_string(),
            lock_ttl_seconds: 10,
            recovery_lock_ttl_seconds: 300,
            lock_fallback: LockFallback::Proceed,
            key_prefix: "hub:".to_string(),
        }
    }
}

impl CoordinationConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.enabled {
            if self.redis_url.is_empty() {
                return Err(anyhow::anyhow!("启用集群协调时Redis URL不能为空"));
            }
            if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
                return Err(anyhow::anyhow!("Redis URL格式无效: {}", self.redis_url));
            }
        }

        if self.channel.is_empty() {
            return Err(anyhow::anyhow!("通知频道名称不能为空"));
        }

        if self.lock_ttl_seconds == 0 || self.recovery_lock_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("锁过期时间必须大于0"));
        }

        Ok(())
    }
}
