use serde::{Deserialize, Serialize};

/// 发起请求的用户身份
///
/// 认证与会话签发不在本服务内，调用方传入已认证的身份即可。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i64,
    pub username: String,
}

impl Actor {
    pub fn new(user_id: i64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }

    /// 系统内部操作（启动恢复、集群消息处理）使用的身份
    pub fn system() -> Self {
        Self {
            user_id: 0,
            username: "system".to_string(),
        }
    }
}

/// 权限级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    /// 可以查看实体，但连接配置会被隐藏
    Read,
    /// 可以查看完整配置
    ReadConfig,
    /// 可以修改实体
    Write,
}
