use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{HubError, HubResult};

/// 定时任务定义
///
/// # 字段说明
///
/// - `cron_expression`: 触发时间表达式（秒级，6或7段）
/// - `start_date` / `end_date`: 生效时间窗口，左闭右开
/// - `job_type`: 任务载荷类型，决定由哪个执行器处理
/// - `job_status`: 状态机当前状态
/// - `failure_reason`: 最近一次进入 `FAILED` 的原因
/// - `config`: 载荷执行器使用的任务配置（收件人、内容模板等）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub cron_expression: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub job_type: JobType,
    pub job_status: JobStatus,
    pub failure_reason: Option<String>,
    pub config: serde_json::Value,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl CronJob {
    /// 检查给定时间是否落在生效窗口 `[start_date, end_date)` 内
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now < self.end_date
    }

    pub fn is_started(&self) -> bool {
        self.job_status == JobStatus::Start
    }
}

/// 任务载荷类型
///
/// 未识别的类型保留原始字符串，分发时记录日志后丢弃。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    Email,
    ChatNotify,
    Unknown(String),
}

impl JobType {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "email" | "EMAIL" => JobType::Email,
            "chat_notify" | "CHAT_NOTIFY" | "weChatWork" => JobType::ChatNotify,
            other => JobType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobType::Email => "email",
            JobType::ChatNotify => "chat_notify",
            JobType::Unknown(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, JobType::Unknown(_))
    }
}

impl From<String> for JobType {
    fn from(s: String) -> Self {
        JobType::parse(&s)
    }
}

impl From<JobType> for String {
    fn from(t: JobType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 定时任务状态
///
/// | 当前状态 | 操作 | 目标状态 |
/// |---|---|---|
/// | NEW / STOP / FAILED | start | START（注册触发器失败则 FAILED） |
/// | START / FAILED | stop | STOP（移除触发器失败则 FAILED） |
/// | 非 START | 编辑 | 不变 |
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    #[serde(rename = "new")]
    New,
    #[serde(rename = "started")]
    Start,
    #[serde(rename = "stopped")]
    Stop,
    #[serde(rename = "failed")]
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Start => "started",
            JobStatus::Stop => "stopped",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(JobStatus::New),
            "started" => Some(JobStatus::Start),
            "stopped" => Some(JobStatus::Stop),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn can_start(&self) -> bool {
        matches!(self, JobStatus::New | JobStatus::Stop | JobStatus::Failed)
    }

    /// FAILED 状态可能残留触发器，允许再次停止以清理
    pub fn can_stop(&self) -> bool {
        matches!(self, JobStatus::Start | JobStatus::Failed)
    }

    pub fn is_editable(&self) -> bool {
        !matches!(self, JobStatus::Start)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Postgres> for JobStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for JobStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        JobStatus::parse(s).ok_or_else(|| format!("Invalid job status: {s}").into())
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        JobStatus::parse(s).ok_or_else(|| format!("Invalid job status: {s}").into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for JobStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 创建定时任务请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJobCreate {
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub cron_expression: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub job_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// 更新定时任务请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJobUpdate {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub cron_expression: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub job_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// 校验时间窗口与任务类型字段
pub fn validate_job_fields(
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    job_type: &str,
) -> HubResult<()> {
    if start_date >= end_date {
        return Err(HubError::validation("开始时间必须早于结束时间"));
    }
    if job_type.trim().is_empty() {
        return Err(HubError::validation("任务类型不能为空"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_transitions() {
        assert!(JobStatus::New.can_start());
        assert!(JobStatus::Stop.can_start());
        assert!(JobStatus::Failed.can_start());
        assert!(!JobStatus::Start.can_start());

        assert!(JobStatus::Start.can_stop());
        assert!(JobStatus::Failed.can_stop());
        assert!(!JobStatus::New.can_stop());

        assert!(!JobStatus::Start.is_editable());
        assert!(JobStatus::Failed.is_editable());
    }

    #[test]
    fn test_job_type_parse() {
        assert_eq!(JobType::parse("email"), JobType::Email);
        assert_eq!(JobType::parse("weChatWork"), JobType::ChatNotify);
        assert_eq!(JobType::parse(" CHAT_NOTIFY "), JobType::ChatNotify);
        assert_eq!(JobType::parse("fax"), JobType::Unknown("fax".to_string()));
        assert!(!JobType::parse("fax").is_known());
    }

    #[test]
    fn test_job_type_serde_roundtrip_as_string() {
        let json = serde_json::to_string(&JobType::ChatNotify).unwrap();
        assert_eq!(json, "\"chat_notify\"");
        let parsed: JobType = serde_json::from_str("\"email\"").unwrap();
        assert_eq!(parsed, JobType::Email);
    }

    #[test]
    fn test_window_is_half_open() {
        let now = Utc::now();
        let job = CronJob {
            id: 1,
            project_id: 1,
            name: "j".to_string(),
            description: None,
            cron_expression: "0 * * * * *".to_string(),
            start_date: now - Duration::hours(1),
            end_date: now,
            job_type: JobType::Email,
            job_status: JobStatus::New,
            failure_reason: None,
            config: serde_json::Value::Null,
            created_by: 1,
            created_at: now,
            updated_by: None,
            updated_at: now,
        };
        assert!(job.is_within_window(now - Duration::minutes(1)));
        assert!(job.is_within_window(now - Duration::hours(1)));
        assert!(!job.is_within_window(now));
    }

    #[test]
    fn test_validate_job_fields() {
        let now = Utc::now();
        assert!(validate_job_fields(now, now + Duration::days(1), "email").is_ok());
        assert!(validate_job_fields(now, now, "email").is_err());
        assert!(validate_job_fields(now, now + Duration::days(1), " ").is_err());
    }
}
