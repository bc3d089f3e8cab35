use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::traits::DataStorePoolOptions;

/// 外部数据源连接池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub connect_timeout_seconds: u64,
    pub max_connections: u32,
    pub min_connections: u32,
    pub idle_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: 10,
            max_connections: 8,
            min_connections: 0,
            idle_timeout_seconds: 600,
            max_lifetime_seconds: 1800,
        }
    }
}

impl PoolConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// 转换为驱动建池参数，0 表示不限制空闲与存活时间
    pub fn pool_options(&self) -> DataStorePoolOptions {
        DataStorePoolOptions {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout: self.connect_timeout(),
            idle_timeout: (self.idle_timeout_seconds > 0).then(|| Duration::from_secs(self.idle_timeout_seconds)),
            max_lifetime: (self.max_lifetime_seconds > 0).then(|| Duration::from_secs(self.max_lifetime_seconds)),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.connect_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }

        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("连接池最大连接数必须大于0"));
        }

        if self.min_connections > self.max_connections {
            return Err(anyhow::anyhow!("连接池最小连接数不能大于最大连接数"));
        }

        Ok(())
    }
}
