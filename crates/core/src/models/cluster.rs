use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::EntityKind;
use crate::HubResult;

/// 失效消息的目标处理器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// 释放本地连接池，负载为连接指纹
    SourceRelease,
    /// 移除本地触发器，负载为任务ID
    CronJobStop,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::SourceRelease => "source_release",
            HandlerKind::CronJobStop => "cronjob_stop",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 集群失效消息
///
/// 通过发布订阅通道广播给包括发送方在内的所有节点，投递语义为至多一次。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationMessage {
    pub handler: HandlerKind,
    pub payload: String,
    pub correlation_id: String,
    /// 发送节点ID，仅用于日志
    pub origin: String,
}

impl InvalidationMessage {
    pub fn new(handler: HandlerKind, payload: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            handler,
            payload: payload.into(),
            correlation_id: Uuid::new_v4().to_string(),
            origin: origin.into(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn to_json(&self) -> HubResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> HubResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// 协调存储中的锁键
///
/// 名称锁与启动恢复锁使用不同的键格式，互不干扰。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    /// 名称唯一性锁: `lock:{kind}:name:{scope}:{name}`
    pub fn for_name(kind: EntityKind, scope: i64, name: &str) -> Self {
        Self(format!("lock:{}:name:{}:{}", kind.as_str(), scope, name.trim()))
    }

    /// 启动恢复锁: `lock:{kind}:startup:{scope}:{id}`
    pub fn for_recovery(kind: EntityKind, scope: i64, id: i64) -> Self {
        Self(format!("lock:{}:startup:{}:{}", kind.as_str(), scope, id))
    }

    pub fn with_prefix(self, prefix: &str) -> Self {
        if prefix.is_empty() {
            self
        } else {
            Self(format!("{}{}", prefix, self.0))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_json_shape() {
        let msg = InvalidationMessage::new(HandlerKind::SourceRelease, "abc", "node-1")
            .with_correlation_id("c-1");
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"handler\":\"source_release\""));
        assert!(json.contains("\"correlation_id\":\"c-1\""));
        assert_eq!(InvalidationMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_malformed_message_is_error() {
        assert!(InvalidationMessage::from_json("{not json").is_err());
        assert!(InvalidationMessage::from_json(r#"{"handler":"nope","payload":"","correlation_id":"","origin":""}"#).is_err());
    }

    #[test]
    fn test_lock_keys_are_distinct_per_purpose() {
        let name = LockKey::for_name(EntityKind::CronJob, 7, "12");
        let recovery = LockKey::for_recovery(EntityKind::CronJob, 7, 12);
        assert_ne!(name, recovery);
        assert_eq!(name.as_str(), "lock:cronjob:name:7:12");
        assert_eq!(recovery.as_str(), "lock:cronjob:startup:7:12");
        assert_eq!(
            LockKey::for_name(EntityKind::Source, 1, " pg1 ").with_prefix("hub:").as_str(),
            "hub:lock:source:name:1:pg1"
        );
    }
}
