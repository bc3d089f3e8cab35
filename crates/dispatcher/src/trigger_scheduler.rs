use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hub_core::{
    models::CronJob,
    traits::{FireHandler, TriggerScheduler},
    Clock, HubError, HubResult,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cron_utils::CronScheduler;

/// 基于 tokio 定时器的触发器调度
///
/// 每个任务一个定时任务，按表达式计算下一次触发时间并睡眠到点，
/// 到点后只调用 [`FireHandler::on_fire`] 投递，不在定时任务上执行载荷。
pub struct CronTriggerScheduler {
    fire_handler: Arc<dyn FireHandler>,
    clock: Arc<dyn Clock>,
    triggers: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl CronTriggerScheduler {
    pub fn new(fire_handler: Arc<dyn FireHandler>, clock: Arc<dyn Clock>) -> Self {
        Self {
            fire_handler,
            clock,
            triggers: Mutex::new(HashMap::new()),
        }
    }

    /// 当前仍在运行的触发器
    pub async fn job_ids(&self) -> Vec<i64> {
        let triggers = self.triggers.lock().await;
        let mut ids: Vec<i64> = triggers
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// 停止全部触发器，进程退出时调用
    pub async fn shutdown(&self) {
        let mut triggers = self.triggers.lock().await;
        for (_, handle) in triggers.drain() {
            handle.abort();
        }
        info!("全部触发器已停止");
    }
}

async fn run_trigger(job: CronJob, schedule: CronScheduler, handler: Arc<dyn FireHandler>, clock: Arc<dyn Clock>) {
    let mut from = clock.now();
    loop {
        let Some(next) = schedule.next_fire_in_window(from, job.start_date, job.end_date) else {
            info!("任务 {} 的触发器已过生效窗口，停止触发", job.id);
            break;
        };

        let wait = (next - clock.now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        debug!("任务 {} 触发: {}", job.id, next);
        handler.on_fire(&job);
        from = next;
    }
}

#[async_trait]
impl TriggerScheduler for CronTriggerScheduler {
    async fn add_job(&self, job: &CronJob) -> HubResult<()> {
        let schedule = CronScheduler::new(&job.cron_expression)?;
        let now = self.clock.now();

        let first = schedule
            .next_fire_in_window(now, job.start_date, job.end_date)
            .ok_or_else(|| {
                HubError::scheduling(format!(
                    "任务 {} 在生效窗口 [{}, {}) 内不会再触发",
                    job.id, job.start_date, job.end_date
                ))
            })?;

        let handle = tokio::spawn(run_trigger(
            job.clone(),
            schedule,
            self.fire_handler.clone(),
            self.clock.clone(),
        ));

        let mut triggers = self.triggers.lock().await;
        if let Some(previous) = triggers.insert(job.id, handle) {
            previous.abort();
            debug!("替换任务 {} 的已有触发器", job.id);
        }
        info!("任务 {} 触发器已注册，首次触发时间 {}", job.id, first);
        Ok(())
    }

    async fn modify_job(&self, job: &CronJob) -> HubResult<()> {
        self.remove_job(job.id).await?;
        self.add_job(job).await
    }

    async fn remove_job(&self, job_id: i64) -> HubResult<()> {
        let removed = self.triggers.lock().await.remove(&job_id);
        match removed {
            Some(handle) => {
                handle.abort();
                info!("任务 {} 触发器已移除", job_id);
            }
            None => debug!("任务 {} 没有触发器，无需移除", job_id),
        }
        Ok(())
    }

    async fn contains(&self, job_id: i64) -> bool {
        self.triggers
            .lock()
            .await
            .get(&job_id)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}
