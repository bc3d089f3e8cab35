use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::ConnectionSpec;
use crate::security::CredentialCodec;
use crate::{HubError, HubResult};

/// 数据源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Jdbc,
    Csv,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Jdbc => "jdbc",
            SourceType::Csv => "csv",
        }
    }

    pub fn parse(s: &str) -> HubResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jdbc" => Ok(SourceType::Jdbc),
            "csv" => Ok(SourceType::Csv),
            other => Err(HubError::validation(format!("无效的数据源类型: {other}"))),
        }
    }
}

/// 数据源配置（持久化记录）
///
/// `password` 字段保存的是 [`CredentialCodec`] 加密后的密文。
#[derive(Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub source_type: SourceType,
    pub url: String,
    pub username: String,
    pub password: String,
    pub version: Option<String>,
    pub ext: bool,
    pub properties: BTreeMap<String, String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for DataSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceConfig")
            .field("id", &self.id)
            .field("project_id", &self.project_id)
            .field("name", &self.name)
            .field("source_type", &self.source_type)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("version", &self.version)
            .field("ext", &self.ext)
            .finish_non_exhaustive()
    }
}

impl DataSourceConfig {
    /// 连接池标签，格式为 `id@name`
    pub fn pool_label(&self) -> String {
        format!("{}@{}", self.id, self.name)
    }

    /// 派生当前字段对应的连接参数，密码在此处短暂解密
    pub fn connection_spec(&self, codec: &CredentialCodec) -> ConnectionSpec {
        ConnectionSpec::new(
            self.pool_label(),
            &ConnectionParams {
                url: self.url.clone(),
                username: self.username.clone(),
                password: codec.decrypt(&self.password),
                version: self.version.clone(),
                ext: self.ext,
                properties: self.properties.clone(),
            },
        )
    }
}

/// 用户提交的连接参数，密码为明文
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub url: String,
    pub username: String,
    pub password: String,
    pub version: Option<String>,
    #[serde(default)]
    pub ext: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"******")
            .field("version", &self.version)
            .field("ext", &self.ext)
            .finish()
    }
}

impl ConnectionParams {
    pub fn validate(&self) -> HubResult<()> {
        if self.url.trim().is_empty() {
            return Err(HubError::validation("连接地址不能为空"));
        }
        Ok(())
    }
}

/// 创建数据源请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCreate {
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub source_type: String,
    pub config: ConnectionParams,
}

/// 更新数据源请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceUpdate {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub config: ConnectionParams,
}

/// 数据源详情，`config` 中的密码已解密；仅有只读权限时配置被隐藏
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDetail {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub source_type: SourceType,
    pub config: Option<ConnectionParams>,
    pub updated_at: DateTime<Utc>,
}

/// 校验名称字段
pub fn validate_name(name: &str) -> HubResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(HubError::validation("名称不能为空"));
    }
    if trimmed.chars().count() > 255 {
        return Err(HubError::validation("名称长度不能超过255个字符"));
    }
    Ok(())
}
