//! 测试数据构造器，带合理默认值

use chrono::{DateTime, Duration, Utc};
use hub_core::{
    models::{CronJob, DataSourceConfig, JobStatus, JobType, SourceType},
    security::CredentialCodec,
    HubResult,
};
use std::collections::BTreeMap;

/// 定时任务构造器
///
/// 默认生效窗口为 [现在-1天, 现在+30天)，每天8点触发的邮件任务。
pub struct CronJobBuilder {
    job: CronJob,
}

impl CronJobBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            job: CronJob {
                id: 1,
                project_id: 1,
                name: "daily_report".to_string(),
                description: None,
                cron_expression: "0 0 8 * * ?".to_string(),
                start_date: now - Duration::days(1),
                end_date: now + Duration::days(30),
                job_type: JobType::Email,
                job_status: JobStatus::New,
                failure_reason: None,
                config: serde_json::json!({ "to": "ops@example.com" }),
                created_by: 1,
                created_at: now,
                updated_by: None,
                updated_at: now,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.job.id = id;
        self
    }

    pub fn with_project(mut self, project_id: i64) -> Self {
        self.job.project_id = project_id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.job.name = name.to_string();
        self
    }

    pub fn with_cron(mut self, cron_expression: &str) -> Self {
        self.job.cron_expression = cron_expression.to_string();
        self
    }

    pub fn with_window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.job.start_date = start;
        self.job.end_date = end;
        self
    }

    pub fn with_job_type(mut self, job_type: &str) -> Self {
        self.job.job_type = JobType::parse(job_type);
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.job.job_status = status;
        self
    }

    pub fn build(self) -> CronJob {
        self.job
    }
}

impl Default for CronJobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 数据源配置构造器，密码字段保存的是密文
pub struct DataSourceConfigBuilder {
    source: DataSourceConfig,
}

impl DataSourceConfigBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            source: DataSourceConfig {
                id: 1,
                project_id: 1,
                name: "pg1".to_string(),
                description: None,
                source_type: SourceType::Jdbc,
                url: "jdbc:postgresql://h/db".to_string(),
                username: "u".to_string(),
                password: String::new(),
                version: None,
                ext: false,
                properties: BTreeMap::new(),
                created_by: 1,
                created_at: now,
                updated_by: None,
                updated_at: now,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.source.id = id;
        self
    }

    pub fn with_project(mut self, project_id: i64) -> Self {
        self.source.project_id = project_id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.source.name = name.to_string();
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.source.url = url.to_string();
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.source.username = username.to_string();
        self
    }

    /// 用给定编码器加密明文密码
    pub fn with_password(mut self, codec: &CredentialCodec, password: &str) -> HubResult<Self> {
        self.source.password = codec.encrypt(password)?;
        Ok(self)
    }

    pub fn build(self) -> DataSourceConfig {
        self.source
    }
}

impl Default for DataSourceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
