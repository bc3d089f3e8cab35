//! # 数据模型
//!
//! 定义数据源注册中心与定时任务调度的核心数据结构。
//!
//! ## 核心模型
//!
//! ### DataSourceConfig - 数据源配置
//! 持久化的数据源定义，密码始终以密文存储，仅在建立连接时短暂解密。
//!
//! ### ConnectionSpec - 连接参数
//! 由数据源配置派生的瞬时连接参数，用于计算连接指纹和建立连接池。
//!
//! ### CronJob - 定时任务
//! 持久化的定时任务定义，包含CRON表达式、生效时间窗口和状态机。
//!
//! ### InvalidationMessage - 集群失效消息
//! 通过发布订阅通道广播的瞬时消息，不做持久化。
//!
//! ## 设计原则
//!
//! - 所有时间字段使用 `DateTime<Utc>` 确保时区一致性
//! - 状态字段使用枚举类型，避免无效状态
//! - 敏感字段的 `Debug` 输出做脱敏处理

pub mod actor;
pub mod cluster;
pub mod connection;
pub mod cron_job;
pub mod source;

pub use actor::*;
pub use cluster::*;
pub use connection::*;
pub use cron_job::*;
pub use source::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// 受名称唯一性约束的实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Source,
    CronJob,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Source => "source",
            EntityKind::CronJob => "cronjob",
        }
    }

    /// 用于错误信息的中文名称
    pub fn display_name(&self) -> &'static str {
        match self {
            EntityKind::Source => "数据源",
            EntityKind::CronJob => "定时任务",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
