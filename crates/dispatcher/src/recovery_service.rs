use std::sync::Arc;
use std::time::{Duration, Instant};

use hub_core::{
    config::LockFallback,
    models::{Actor, CronJob, EntityKind, JobStatus, LockKey},
    traits::{CronJobRepository, TriggerScheduler},
    HubResult,
};
use hub_infrastructure::{DistributedNameLock, LockOutcome};
use tracing::{debug, error, info, warn};

/// 启动恢复报告
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    /// 本节点注册了触发器的任务
    pub registered: Vec<i64>,
    /// 已由其他节点恢复而跳过的任务
    pub skipped: Vec<i64>,
    /// 注册失败并被标记为 FAILED 的任务及原因
    pub failed: Vec<(i64, String)>,
    pub recovery_duration_ms: u64,
}

/// 启动时恢复 START 状态任务的触发器
///
/// 每个任务先以 (类型, 项目, 任务ID) 加恢复锁，锁保留到过期，
/// 多个节点同时启动时同一任务只会被注册一次。
pub struct JobRecoveryService {
    job_repo: Arc<dyn CronJobRepository>,
    scheduler: Arc<dyn TriggerScheduler>,
    lock: DistributedNameLock,
    lock_ttl: Duration,
    fallback: LockFallback,
}

impl JobRecoveryService {
    pub fn new(
        job_repo: Arc<dyn CronJobRepository>,
        scheduler: Arc<dyn TriggerScheduler>,
        lock: DistributedNameLock,
        lock_ttl: Duration,
        fallback: LockFallback,
    ) -> Self {
        Self {
            job_repo,
            scheduler,
            lock,
            lock_ttl,
            fallback,
        }
    }

    pub async fn recover_started_jobs(&self) -> HubResult<RecoveryReport> {
        let started_at = Instant::now();
        let jobs = self.job_repo.list_by_status(JobStatus::Start).await?;
        info!("开始恢复定时任务，共 {} 个 START 状态任务", jobs.len());

        let mut report = RecoveryReport::default();
        for job in jobs {
            if !self.claim(&job).await {
                report.skipped.push(job.id);
                continue;
            }

            match self.scheduler.add_job(&job).await {
                Ok(()) => report.registered.push(job.id),
                Err(e) => {
                    let reason = e.to_string();
                    error!("恢复任务 {} 触发器失败: {}", job.id, reason);
                    if let Err(update_err) = self
                        .job_repo
                        .update_status(job.id, JobStatus::Failed, Some(&reason), Actor::system().user_id)
                        .await
                    {
                        error!("更新任务 {} 状态为 FAILED 失败: {}", job.id, update_err);
                    }
                    report.failed.push((job.id, reason));
                }
            }
        }

        report.recovery_duration_ms = started_at.elapsed().as_millis() as u64;
        info!(
            "定时任务恢复完成: 注册 {}, 跳过 {}, 失败 {}, 耗时 {}ms",
            report.registered.len(),
            report.skipped.len(),
            report.failed.len(),
            report.recovery_duration_ms
        );
        Ok(report)
    }

    /// 抢占恢复锁，返回本节点是否负责该任务
    async fn claim(&self, job: &CronJob) -> bool {
        let key = LockKey::for_recovery(EntityKind::CronJob, job.project_id, job.id);
        match self.lock.acquire(key, self.lock_ttl).await {
            LockOutcome::Locked(guard) => {
                guard.retain_until_expiry();
                true
            }
            LockOutcome::Contended => {
                debug!("任务 {} 已由其他节点恢复", job.id);
                false
            }
            LockOutcome::Unsupported(reason) => match self.fallback {
                LockFallback::Proceed => {
                    warn!("恢复锁不可用，按单节点模式恢复任务 {}: {}", job.id, reason);
                    true
                }
                LockFallback::Reject => {
                    warn!("恢复锁不可用，跳过任务 {}: {}", job.id, reason);
                    false
                }
            },
        }
    }
}
