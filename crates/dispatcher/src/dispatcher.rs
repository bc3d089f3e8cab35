use std::sync::Arc;
use std::time::{Duration, Instant};

use hub_core::{config::SchedulerConfig, models::CronJob, traits::FireHandler, Clock};
use hub_infrastructure::{MetricsCollector, StructuredLogger};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::executor_registry::ExecutorRegistry;

/// 投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 已进入执行队列
    Queued,
    /// 当前时间不在生效窗口内，丢弃
    OutOfWindow,
    /// 没有对应类型的执行器，丢弃
    UnknownType,
    /// 队列已满或已关闭
    Rejected(&'static str),
}

/// 执行分发参数
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub execution_timeout: Duration,
}

impl From<&SchedulerConfig> for DispatcherOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            worker_count: config.worker_count,
            queue_capacity: config.queue_capacity,
            execution_timeout: config.execution_timeout(),
        }
    }
}

struct ExecutionContext {
    executors: ExecutorRegistry,
    clock: Arc<dyn Clock>,
    execution_timeout: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ExecutionContext {
    /// 窗口与类型检查，不通过时记录日志并返回丢弃原因
    fn precheck(&self, job: &CronJob) -> Option<DispatchOutcome> {
        let now = self.clock.now();
        if !job.is_within_window(now) {
            StructuredLogger::log_job_fire_out_of_window(
                job.id,
                now,
                job.start_date,
                job.end_date,
                &job.cron_expression,
            );
            self.record_dropped("out_of_window");
            return Some(DispatchOutcome::OutOfWindow);
        }

        if !self.executors.supports(&job.job_type) {
            StructuredLogger::log_unknown_job_type(job.id, job.job_type.as_str());
            self.record_dropped("unknown_type");
            return Some(DispatchOutcome::UnknownType);
        }
        None
    }

    fn record_dropped(&self, reason: &'static str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_dispatch_dropped(reason);
        }
    }

    async fn execute(&self, job: CronJob) {
        // 排队期间窗口可能已经结束
        if self.precheck(&job).is_some() {
            return;
        }
        let Some(executor) = self.executors.get(&job.job_type) else {
            return;
        };

        let job_id = job.id;
        let job_type = job.job_type.to_string();
        let started = Instant::now();

        let task = tokio::spawn(async move { executor.execute(&job).await });
        let abort = task.abort_handle();

        let (label, error) = match tokio::time::timeout(self.execution_timeout, task).await {
            Ok(Ok(Ok(()))) => ("success", None),
            Ok(Ok(Err(e))) => ("failure", Some(e.to_string())),
            Ok(Err(join_error)) => ("failure", Some(format!("执行器异常退出: {join_error}"))),
            Err(_) => {
                abort.abort();
                (
                    "timeout",
                    Some(format!("执行超时({}秒)", self.execution_timeout.as_secs_f64())),
                )
            }
        };

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_job_execution(label, elapsed.as_secs_f64());
        }
        StructuredLogger::log_job_execution_complete(
            job_id,
            &job_type,
            error.is_none(),
            elapsed.as_millis() as u64,
            error.as_deref(),
        );
    }
}

/// 任务执行分发器
///
/// 触发回调只做 `try_send` 投递；消费循环按 `worker_count` 并发执行，
/// 每次执行都在独立任务中进行，单个任务失败或超时不影响其他任务。
/// 队列满时拒绝并记录，不做重试。
pub struct JobDispatcher {
    sender: mpsc::Sender<CronJob>,
    context: Arc<ExecutionContext>,
}

/// 消费循环句柄，关闭时等待队列排空
pub struct DispatcherHandle {
    consumer: JoinHandle<()>,
}

impl DispatcherHandle {
    pub async fn join(self) {
        if let Err(e) = self.consumer.await {
            warn!("任务分发消费循环异常退出: {}", e);
        }
    }
}

impl JobDispatcher {
    pub fn start(
        options: DispatcherOptions,
        executors: ExecutorRegistry,
        clock: Arc<dyn Clock>,
        metrics: Option<Arc<MetricsCollector>>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> (Arc<Self>, DispatcherHandle) {
        let (sender, receiver) = mpsc::channel(options.queue_capacity.max(1));
        let context = Arc::new(ExecutionContext {
            executors,
            clock,
            execution_timeout: options.execution_timeout,
            metrics,
        });

        let consumer = tokio::spawn(run_consumer(
            receiver,
            context.clone(),
            options.worker_count.max(1),
            shutdown_rx,
        ));
        info!(
            "任务分发器已启动: workers={}, queue={}",
            options.worker_count, options.queue_capacity
        );

        (Arc::new(Self { sender, context }), DispatcherHandle { consumer })
    }

    /// 投递一次触发
    pub fn submit(&self, job: CronJob) -> DispatchOutcome {
        if let Some(metrics) = &self.context.metrics {
            metrics.record_job_fired();
        }
        if let Some(outcome) = self.context.precheck(&job) {
            return outcome;
        }

        let job_id = job.id;
        match self.sender.try_send(job) {
            Ok(()) => {
                debug!("任务 {} 已进入执行队列", job_id);
                DispatchOutcome::Queued
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                StructuredLogger::log_dispatch_rejected(job_id, "执行队列已满");
                self.context.record_dropped("queue_full");
                DispatchOutcome::Rejected("queue_full")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                StructuredLogger::log_dispatch_rejected(job_id, "分发器已关闭");
                self.context.record_dropped("closed");
                DispatchOutcome::Rejected("closed")
            }
        }
    }
}

impl FireHandler for JobDispatcher {
    fn on_fire(&self, job: &CronJob) {
        self.submit(job.clone());
    }
}

async fn run_consumer(
    mut receiver: mpsc::Receiver<CronJob>,
    context: Arc<ExecutionContext>,
    worker_count: usize,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let permits = Arc::new(Semaphore::new(worker_count));

    loop {
        tokio::select! {
            next = receiver.recv() => match next {
                Some(job) => spawn_execution(job, &context, &permits).await,
                None => break,
            },
            _ = shutdown_rx.recv() => {
                info!("任务分发器收到关闭信号，处理剩余队列");
                receiver.close();
                while let Some(job) = receiver.recv().await {
                    spawn_execution(job, &context, &permits).await;
                }
                break;
            }
        }
    }

    // 等待执行中的任务结束
    if let Ok(all) = permits.acquire_many(worker_count as u32).await {
        drop(all);
    }
    info!("任务分发器已停止");
}

async fn spawn_execution(job: CronJob, context: &Arc<ExecutionContext>, permits: &Arc<Semaphore>) {
    let Ok(permit) = permits.clone().acquire_owned().await else {
        return;
    };
    let context = context.clone();
    tokio::spawn(async move {
        let _permit = permit;
        context.execute(job).await;
    });
}
