use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hub_core::{
    models::{
        validate_job_fields, validate_name, Actor, CronJob, CronJobCreate, CronJobUpdate, EntityKind, JobStatus,
        JobType, Permission,
    },
    traits::{CronJobRepository, PermissionGate, TriggerScheduler},
    HubError, HubResult,
};
use hub_dispatcher::{CronScheduler, DispatchOutcome, JobDispatcher};
use hub_infrastructure::StructuredLogger;
use tracing::{error, info, instrument, warn};

use crate::interfaces::{CronJobControlService, CronJobService};
use crate::services::{InvalidationMode, NameGuard};

/// 定时任务用例实现
pub struct CronJobManager {
    repo: Arc<dyn CronJobRepository>,
    scheduler: Arc<dyn TriggerScheduler>,
    dispatcher: Arc<JobDispatcher>,
    permissions: Arc<dyn PermissionGate>,
    name_guard: Arc<NameGuard>,
    invalidation: InvalidationMode,
}

impl CronJobManager {
    pub fn new(
        repo: Arc<dyn CronJobRepository>,
        scheduler: Arc<dyn TriggerScheduler>,
        dispatcher: Arc<JobDispatcher>,
        permissions: Arc<dyn PermissionGate>,
        name_guard: Arc<NameGuard>,
        invalidation: InvalidationMode,
    ) -> Self {
        Self {
            repo,
            scheduler,
            dispatcher,
            permissions,
            name_guard,
            invalidation,
        }
    }

    async fn load(&self, id: i64) -> HubResult<CronJob> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| HubError::not_found("定时任务", id))
    }

    async fn authorize(
        &self,
        actor: &Actor,
        project_id: i64,
        entity_id: Option<i64>,
        permission: Permission,
    ) -> HubResult<()> {
        if self
            .permissions
            .check(actor, EntityKind::CronJob, project_id, entity_id, permission)
            .await
        {
            Ok(())
        } else {
            Err(HubError::unauthorized(format!(
                "用户 {} 没有定时任务的 {:?} 权限",
                actor.username, permission
            )))
        }
    }

    fn validate_definition(
        name: &str,
        cron_expression: &str,
        start_date: chrono::DateTime<Utc>,
        end_date: chrono::DateTime<Utc>,
        job_type: &str,
    ) -> HubResult<()> {
        validate_name(name)?;
        validate_job_fields(start_date, end_date, job_type)?;
        CronScheduler::validate_cron_expression(cron_expression)
    }

    /// 记录 FAILED 及原因，返回调度错误
    async fn mark_failed(&self, job: &CronJob, actor: &Actor, reason: String) -> HubError {
        error!("定时任务 {} ({}) 进入 FAILED: {}", job.id, job.name, reason);
        if let Err(e) = self
            .repo
            .update_status(job.id, JobStatus::Failed, Some(&reason), actor.user_id)
            .await
        {
            warn!("记录任务 {} 失败状态出错: {}", job.id, e);
        }
        HubError::scheduling(reason)
    }

    async fn create_locked(&self, actor: &Actor, request: &CronJobCreate) -> HubResult<CronJob> {
        let name = request.name.trim();
        if self.repo.find_by_name(request.project_id, name).await?.is_some() {
            return Err(HubError::name_conflict(EntityKind::CronJob, name));
        }

        let now = Utc::now();
        let job = CronJob {
            id: 0,
            project_id: request.project_id,
            name: name.to_string(),
            description: request.description.clone(),
            cron_expression: request.cron_expression.trim().to_string(),
            start_date: request.start_date,
            end_date: request.end_date,
            job_type: JobType::parse(&request.job_type),
            job_status: JobStatus::New,
            failure_reason: None,
            config: request.config.clone(),
            created_by: actor.user_id,
            created_at: now,
            updated_by: None,
            updated_at: now,
        };
        self.repo.create(&job).await
    }

    async fn update_locked(
        &self,
        actor: &Actor,
        existing: &CronJob,
        request: &CronJobUpdate,
        renamed: bool,
    ) -> HubResult<CronJob> {
        let name = request.name.trim();
        if renamed {
            if let Some(other) = self.repo.find_by_name(existing.project_id, name).await? {
                if other.id != existing.id {
                    return Err(HubError::name_conflict(EntityKind::CronJob, name));
                }
            }
        }

        let mut updated = existing.clone();
        updated.name = name.to_string();
        updated.description = request.description.clone();
        updated.cron_expression = request.cron_expression.trim().to_string();
        updated.start_date = request.start_date;
        updated.end_date = request.end_date;
        updated.job_type = JobType::parse(&request.job_type);
        updated.config = request.config.clone();
        updated.updated_by = Some(actor.user_id);
        updated.updated_at = Utc::now();

        self.repo.update(&updated).await?;
        Ok(updated)
    }
}

#[async_trait]
impl CronJobService for CronJobManager {
    #[instrument(skip(self, request), fields(project_id = request.project_id, name = %request.name))]
    async fn create_job(&self, actor: &Actor, request: CronJobCreate) -> HubResult<CronJob> {
        Self::validate_definition(
            &request.name,
            &request.cron_expression,
            request.start_date,
            request.end_date,
            &request.job_type,
        )?;
        self.authorize(actor, request.project_id, None, Permission::Write).await?;

        let name = request.name.trim();
        if self.repo.find_by_name(request.project_id, name).await?.is_some() {
            return Err(HubError::name_conflict(EntityKind::CronJob, name));
        }

        let reservation = self.name_guard.reserve(EntityKind::CronJob, request.project_id, name).await?;
        let result = self.create_locked(actor, &request).await;
        reservation.release().await;

        let created = result?;
        StructuredLogger::log_operation("cron_job", created.id, "create", actor.user_id);
        Ok(created)
    }

    #[instrument(skip(self, request), fields(job_id = request.id))]
    async fn update_job(&self, actor: &Actor, request: CronJobUpdate) -> HubResult<CronJob> {
        let existing = self.load(request.id).await?;
        self.authorize(actor, existing.project_id, Some(existing.id), Permission::Write)
            .await?;
        if !existing.job_status.is_editable() {
            return Err(HubError::validation("任务运行中，请先停止再修改"));
        }
        Self::validate_definition(
            &request.name,
            &request.cron_expression,
            request.start_date,
            request.end_date,
            &request.job_type,
        )?;

        let name = request.name.trim();
        let renamed = existing.name != name;
        if renamed {
            if let Some(other) = self.repo.find_by_name(existing.project_id, name).await? {
                if other.id != existing.id {
                    return Err(HubError::name_conflict(EntityKind::CronJob, name));
                }
            }
        }

        let reservation = if renamed {
            Some(self.name_guard.reserve(EntityKind::CronJob, existing.project_id, name).await?)
        } else {
            None
        };
        let result = self.update_locked(actor, &existing, &request, renamed).await;
        if let Some(reservation) = reservation {
            reservation.release().await;
        }
        let updated = result?;

        // 清理可能残留的旧触发器，下次启动时按新定义注册
        if let Err(e) = self.scheduler.remove_job(updated.id).await {
            return Err(self
                .mark_failed(&updated, actor, format!("移除旧触发器失败: {e}"))
                .await);
        }

        StructuredLogger::log_operation("cron_job", updated.id, "update", actor.user_id);
        Ok(updated)
    }

    async fn delete_job(&self, actor: &Actor, id: i64) -> HubResult<()> {
        let existing = self.load(id).await?;
        self.authorize(actor, existing.project_id, Some(id), Permission::Write)
            .await?;

        if let Err(e) = self.invalidation.stop_job(self.scheduler.as_ref(), id).await {
            warn!("删除任务 {} 时移除触发器失败: {}", id, e);
        }
        self.repo.delete(id).await?;

        StructuredLogger::log_operation("cron_job", id, "delete", actor.user_id);
        Ok(())
    }

    async fn get_job(&self, actor: &Actor, id: i64) -> HubResult<CronJob> {
        let job = self.load(id).await?;
        self.authorize(actor, job.project_id, Some(id), Permission::Read).await?;
        Ok(job)
    }

    async fn list_jobs(&self, actor: &Actor, project_id: i64) -> HubResult<Vec<CronJob>> {
        self.authorize(actor, project_id, None, Permission::Read).await?;
        self.repo.list_by_project(project_id).await
    }
}

#[async_trait]
impl CronJobControlService for CronJobManager {
    #[instrument(skip(self, actor))]
    async fn start_job(&self, actor: &Actor, id: i64) -> HubResult<CronJob> {
        let mut job = self.load(id).await?;
        self.authorize(actor, job.project_id, Some(id), Permission::Write).await?;
        if !job.job_status.can_start() {
            return Err(HubError::validation(format!(
                "任务当前状态为 {}，不能启动",
                job.job_status
            )));
        }

        if let Err(e) = self.scheduler.add_job(&job).await {
            return Err(self.mark_failed(&job, actor, format!("注册触发器失败: {e}")).await);
        }
        if let Err(e) = self
            .repo
            .update_status(id, JobStatus::Start, None, actor.user_id)
            .await
        {
            // 状态没写进去，触发器不能留下
            warn!("任务 {} 启动状态写入失败，撤销触发器: {}", id, e);
            if let Err(remove_err) = self.scheduler.remove_job(id).await {
                return Err(self
                    .mark_failed(&job, actor, format!("撤销触发器失败: {remove_err}"))
                    .await);
            }
            return Err(e);
        }

        job.job_status = JobStatus::Start;
        job.failure_reason = None;
        job.updated_by = Some(actor.user_id);
        info!("定时任务 {} ({}) 已启动", job.id, job.name);
        StructuredLogger::log_operation("cron_job", id, "start", actor.user_id);
        Ok(job)
    }

    #[instrument(skip(self, actor))]
    async fn stop_job(&self, actor: &Actor, id: i64) -> HubResult<CronJob> {
        let mut job = self.load(id).await?;
        self.authorize(actor, job.project_id, Some(id), Permission::Write).await?;
        if !job.job_status.can_stop() {
            return Err(HubError::validation(format!(
                "任务当前状态为 {}，不能停止",
                job.job_status
            )));
        }

        if let Err(e) = self.invalidation.stop_job(self.scheduler.as_ref(), id).await {
            return Err(self.mark_failed(&job, actor, format!("移除触发器失败: {e}")).await);
        }
        self.repo
            .update_status(id, JobStatus::Stop, None, actor.user_id)
            .await?;

        job.job_status = JobStatus::Stop;
        job.failure_reason = None;
        job.updated_by = Some(actor.user_id);
        info!("定时任务 {} ({}) 已停止", job.id, job.name);
        StructuredLogger::log_operation("cron_job", id, "stop", actor.user_id);
        Ok(job)
    }

    async fn execute_job_now(&self, actor: &Actor, id: i64) -> HubResult<DispatchOutcome> {
        let job = self.load(id).await?;
        self.authorize(actor, job.project_id, Some(id), Permission::Write).await?;

        match self.dispatcher.submit(job) {
            DispatchOutcome::Rejected(reason) => Err(HubError::scheduling(format!(
                "任务 {id} 投递被拒绝: {reason}"
            ))),
            outcome => {
                StructuredLogger::log_operation("cron_job", id, "execute", actor.user_id);
                Ok(outcome)
            }
        }
    }
}
