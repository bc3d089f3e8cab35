use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    coordination::CoordinationConfig, database::DatabaseConfig, observability::ObservabilityConfig,
    pool::PoolConfig, scheduler::SchedulerConfig, security::SecurityConfig,
};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/hub.toml";

/// 节点身份
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// 为空时使用主机名
    pub node_id: String,
}

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub coordination: CoordinationConfig,
    pub pool: PoolConfig,
    pub scheduler: SchedulerConfig,
    pub security: SecurityConfig,
    pub observability: ObservabilityConfig,
    pub node: NodeConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: HUB_, nested separator: __)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            builder = builder.add_source(File::new(DEFAULT_CONFIG_PATH, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("HUB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.coordination.validate().context("集群协调配置验证失败")?;
        self.pool.validate().context("连接池配置验证失败")?;
        self.scheduler.validate().context("调度配置验证失败")?;
        self.security.validate().context("安全配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockFallback;
    use std::io::Write;

    const KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = format!(
            r#"
[security]
encryption_key = "{KEY}"

[coordination]
enabled = true
lock_fallback = "reject"
"#
        );
        let config = AppConfig::from_toml(&toml).unwrap();
        assert!(config.coordination.enabled);
        assert_eq!(config.coordination.lock_fallback, LockFallback::Reject);
        assert_eq!(config.coordination.channel, "hub:topic");
        assert_eq!(config.coordination.recovery_lock_ttl_seconds, 300);
        assert_eq!(config.scheduler.worker_count, 4);
    }

    #[test]
    fn test_missing_key_is_rejected() {
        assert!(AppConfig::from_toml("").is_err());
    }

    #[test]
    fn test_invalid_sections_are_rejected() {
        let toml = format!(
            r#"
[security]
encryption_key = "{KEY}"

[scheduler]
worker_count = 0
"#
        );
        assert!(AppConfig::from_toml(&toml).is_err());

        let toml = format!(
            r#"
[security]
encryption_key = "{KEY}"

[database]
url = "postgres://localhost/hub"
"#
        );
        assert!(AppConfig::from_toml(&toml).is_err());
    }

    #[test]
    fn test_load_from_file_and_roundtrip() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[security]\nencryption_key = \"{KEY}\"\n[node]\nnode_id = \"node-a\"").unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.node.node_id, "node-a");

        let text = config.to_toml().unwrap();
        let again = AppConfig::from_toml(&text).unwrap();
        assert_eq!(again.node.node_id, "node-a");
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/hub.toml")).is_err());
    }
}
