use thiserror::Error;

use crate::models::EntityKind;

/// 统一错误类型定义
///
/// 前七类对应对外暴露的失败语义，其余为基础设施层的环境错误。
#[derive(Debug, Error)]
pub enum HubError {
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("{entity}未找到: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("无权执行操作: {0}")]
    Unauthorized(String),

    #[error("名称已被占用: {kind} `{name}`")]
    NameConflict { kind: EntityKind, name: String },

    #[error("数据源连接失败: {0}")]
    ConnectivityFailure(String),

    #[error("任务调度失败: {0}")]
    SchedulingFailure(String),

    #[error("协调存储不可用: {0}")]
    CoordinationUnavailable(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type HubResult<T> = std::result::Result<T, HubError>;

impl HubError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn name_conflict<S: Into<String>>(kind: EntityKind, name: S) -> Self {
        Self::NameConflict {
            kind,
            name: name.into(),
        }
    }

    pub fn connectivity<S: Into<String>>(msg: S) -> Self {
        Self::ConnectivityFailure(msg.into())
    }

    pub fn scheduling<S: Into<String>>(msg: S) -> Self {
        Self::SchedulingFailure(msg.into())
    }

    pub fn coordination<S: Into<String>>(msg: S) -> Self {
        Self::CoordinationUnavailable(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// 调用方可以选择重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HubError::ConnectivityFailure(_) | HubError::CoordinationUnavailable(_)
        )
    }

    /// 失败是否发生在任何持久化副作用之前
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            HubError::Validation(_)
                | HubError::NotFound { .. }
                | HubError::Unauthorized(_)
                | HubError::NameConflict { .. }
                | HubError::InvalidCron { .. }
        )
    }

    pub fn user_message(&self) -> &str {
        match self {
            HubError::Validation(_) | HubError::InvalidCron { .. } => "输入数据验证失败",
            HubError::NotFound { .. } => "请求的资源不存在",
            HubError::Unauthorized(_) => "您没有执行此操作的权限",
            HubError::NameConflict { .. } => "名称已被占用，请更换名称",
            HubError::ConnectivityFailure(_) => "数据源连接失败，请检查连接配置",
            HubError::SchedulingFailure(_) => "任务调度失败，任务已被标记为失败状态",
            HubError::CoordinationUnavailable(_) => "集群协调服务暂不可用，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for HubError {
    fn from(err: anyhow::Error) -> Self {
        HubError::Internal(err.to_string())
    }
}
