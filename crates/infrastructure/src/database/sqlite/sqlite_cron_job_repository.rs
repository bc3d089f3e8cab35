use async_trait::async_trait;
use chrono::Utc;
use hub_core::{
    models::{CronJob, EntityKind, JobStatus, JobType},
    traits::CronJobRepository,
    HubError, HubResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use super::map_write_error;

const SELECT_COLUMNS: &str = "SELECT id, project_id, name, description, cron_expression, start_date, end_date, job_type, job_status, failure_reason, config, created_by, created_at, updated_by, updated_at FROM cron_jobs";

pub struct SqliteCronJobRepository {
    pool: SqlitePool,
}

impl SqliteCronJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> HubResult<CronJob> {
        let job_type: String = row.try_get("job_type")?;
        let config: String = row.try_get("config")?;

        Ok(CronJob {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            cron_expression: row.try_get("cron_expression")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            job_type: JobType::parse(&job_type),
            job_status: row.try_get("job_status")?,
            failure_reason: row.try_get("failure_reason")?,
            config: serde_json::from_str(&config)?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_by: row.try_get("updated_by")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl CronJobRepository for SqliteCronJobRepository {
    #[instrument(skip(self, job), fields(job_name = %job.name, project_id = job.project_id))]
    async fn create(&self, job: &CronJob) -> HubResult<CronJob> {
        let config = serde_json::to_string(&job.config)?;

        let result = sqlx::query(
            r#"
            INSERT INTO cron_jobs (project_id, name, description, cron_expression, start_date, end_date, job_type, job_status, failure_reason, config, created_by, created_at, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(job.project_id)
        .bind(&job.name)
        .bind(&job.description)
        .bind(&job.cron_expression)
        .bind(job.start_date)
        .bind(job.end_date)
        .bind(job.job_type.as_str())
        .bind(job.job_status)
        .bind(&job.failure_reason)
        .bind(config)
        .bind(job.created_by)
        .bind(job.created_at)
        .bind(job.updated_by)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, EntityKind::CronJob, &job.name))?;

        let mut created = job.clone();
        created.id = result.last_insert_rowid();
        debug!("创建定时任务成功: ID {}, 名称: {}", created.id, created.name);
        Ok(created)
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn get_by_id(&self, id: i64) -> HubResult<Option<CronJob>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn find_by_name(&self, project_id: i64, name: &str) -> HubResult<Option<CronJob>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE project_id = $1 AND name = $2"))
            .bind(project_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn list_by_project(&self, project_id: i64) -> HubResult<Vec<CronJob>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE project_id = $1 ORDER BY id"))
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn list_by_status(&self, status: JobStatus) -> HubResult<Vec<CronJob>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE job_status = $1 ORDER BY id"))
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, job_name = %job.name))]
    async fn update(&self, job: &CronJob) -> HubResult<()> {
        let config = serde_json::to_string(&job.config)?;

        let result = sqlx::query(
            r#"
            UPDATE cron_jobs
            SET name = $2, description = $3, cron_expression = $4, start_date = $5, end_date = $6,
                job_type = $7, job_status = $8, failure_reason = $9, config = $10,
                updated_by = $11, updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.description)
        .bind(&job.cron_expression)
        .bind(job.start_date)
        .bind(job.end_date)
        .bind(job.job_type.as_str())
        .bind(job.job_status)
        .bind(&job.failure_reason)
        .bind(config)
        .bind(job.updated_by)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, EntityKind::CronJob, &job.name))?;

        if result.rows_affected() == 0 {
            return Err(HubError::not_found("定时任务", job.id));
        }

        debug!("更新定时任务成功: ID {}", job.id);
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %id, status = %status))]
    async fn update_status(
        &self,
        id: i64,
        status: JobStatus,
        failure_reason: Option<&str>,
        updated_by: i64,
    ) -> HubResult<()> {
        let result = sqlx::query(
            "UPDATE cron_jobs SET job_status = $2, failure_reason = $3, updated_by = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(failure_reason)
        .bind(updated_by)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::not_found("定时任务", id));
        }

        debug!("更新定时任务状态: ID {} -> {}", id, status);
        Ok(())
    }

    async fn delete(&self, id: i64) -> HubResult<()> {
        let result = sqlx::query("DELETE FROM cron_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::not_found("定时任务", id));
        }

        debug!("删除定时任务成功: ID {}", id);
        Ok(())
    }
}
