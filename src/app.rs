use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use hub_application::{CronJobManager, InvalidationMode, NameGuard, SourceManager};
use hub_core::{
    config::AppConfig,
    models::{Actor, EntityKind, Permission},
    traits::{CoordinationStore, CronJobRepository, DataSourceRepository, PermissionGate, TriggerScheduler},
    SystemClock,
};
use hub_dispatcher::{
    CronJobStopHandler, CronTriggerScheduler, DispatcherHandle, DispatcherOptions, ExecutorRegistry, JobDispatcher,
    JobRecoveryService, RecoveryReport,
};
use hub_infrastructure::{
    DatabaseManager, DistributedNameLock, InMemoryCoordinationStore, InvalidationChannel, MetricsCollector,
    RedisCoordinationStore, SqliteCronJobRepository, SqliteSourceRepository, SqlxDataStoreDriver,
};
use hub_registry::{ConnectionPoolRegistry, SourceReleaseHandler};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 信任调用方的权限门
///
/// 独立运行时认证与授权由上游网关完成，这里全部放行。
pub struct TrustedCallerGate;

#[async_trait]
impl PermissionGate for TrustedCallerGate {
    async fn check(
        &self,
        _actor: &Actor,
        _kind: EntityKind,
        _project_id: i64,
        _entity_id: Option<i64>,
        _permission: Permission,
    ) -> bool {
        true
    }
}

/// 主应用程序
///
/// 持有注册中心、触发器、分发器与集群通道，`run` 负责启动恢复、
/// 等待关闭信号并按顺序收尾。
pub struct Application {
    config: AppConfig,
    node_id: String,
    database: DatabaseManager,
    registry: Arc<ConnectionPoolRegistry>,
    scheduler: Arc<CronTriggerScheduler>,
    dispatcher_handle: DispatcherHandle,
    channel: Option<Arc<InvalidationChannel>>,
    recovery: JobRecoveryService,
    sources: Arc<SourceManager>,
    jobs: Arc<CronJobManager>,
}

impl Application {
    /// 创建应用实例，`shutdown_rx` 用于分发器在退出时排空队列
    pub async fn new(
        config: AppConfig,
        executors: ExecutorRegistry,
        permissions: Arc<dyn PermissionGate>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<Self> {
        let node_id = resolve_node_id(&config);
        info!("初始化应用程序，节点: {}", node_id);

        let metrics = Arc::new(MetricsCollector::new());
        let codec = Arc::new(config.security.codec().context("加载加密密钥失败")?);

        // 本地数据库
        let database = DatabaseManager::new(&config.database)
            .await
            .with_context(|| format!("连接数据库失败: {}", config.database.url))?;
        let source_repo: Arc<dyn DataSourceRepository> =
            Arc::new(SqliteSourceRepository::new(database.pool().clone()));
        let job_repo: Arc<dyn CronJobRepository> = Arc::new(SqliteCronJobRepository::new(database.pool().clone()));

        // 外部数据源连接池
        let registry = Arc::new(
            ConnectionPoolRegistry::new(Arc::new(SqlxDataStoreDriver::new()), config.pool.pool_options())
                .with_metrics(metrics.clone()),
        );

        // 触发与执行
        let (dispatcher, dispatcher_handle) = JobDispatcher::start(
            DispatcherOptions::from(&config.scheduler),
            executors,
            Arc::new(SystemClock),
            Some(metrics.clone()),
            shutdown_rx,
        );
        let scheduler = Arc::new(CronTriggerScheduler::new(dispatcher.clone(), Arc::new(SystemClock)));

        // 集群协调
        let coordination = &config.coordination;
        let store: Arc<dyn CoordinationStore> = if coordination.enabled {
            info!("集群模式，协调存储: {}", coordination.redis_url);
            Arc::new(RedisCoordinationStore::new(&coordination.redis_url).context("创建Redis协调存储失败")?)
        } else {
            info!("单节点模式，使用进程内协调存储");
            Arc::new(InMemoryCoordinationStore::new())
        };
        let lock = DistributedNameLock::new(store.clone(), coordination.key_prefix.clone()).with_metrics(metrics.clone());

        let channel = coordination.enabled.then(|| {
            let channel = Arc::new(
                InvalidationChannel::new(store.clone(), coordination.channel.clone(), node_id.clone())
                    .with_metrics(metrics.clone()),
            );
            channel.register_handler(Arc::new(SourceReleaseHandler::new(registry.clone())));
            channel.register_handler(Arc::new(CronJobStopHandler::new(
                scheduler.clone() as Arc<dyn TriggerScheduler>
            )));
            channel
        });
        let invalidation = match &channel {
            Some(channel) => InvalidationMode::Cluster(channel.clone()),
            None => InvalidationMode::Local,
        };

        let name_guard = Arc::new(NameGuard::new(
            lock.clone(),
            Duration::from_secs(coordination.lock_ttl_seconds),
            coordination.lock_fallback,
        ));
        let recovery = JobRecoveryService::new(
            job_repo.clone(),
            scheduler.clone(),
            lock,
            Duration::from_secs(coordination.recovery_lock_ttl_seconds),
            coordination.lock_fallback,
        );

        let sources = Arc::new(SourceManager::new(
            source_repo,
            registry.clone(),
            codec,
            permissions.clone(),
            name_guard.clone(),
            invalidation.clone(),
        ));
        let jobs = Arc::new(CronJobManager::new(
            job_repo,
            scheduler.clone(),
            dispatcher,
            permissions,
            name_guard,
            invalidation,
        ));

        Ok(Self {
            config,
            node_id,
            database,
            registry,
            scheduler,
            dispatcher_handle,
            channel,
            recovery,
            sources,
            jobs,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 数据源用例
    pub fn sources(&self) -> Arc<SourceManager> {
        self.sources.clone()
    }

    /// 定时任务用例
    pub fn jobs(&self) -> Arc<CronJobManager> {
        self.jobs.clone()
    }

    /// 为 START 状态的任务重新注册触发器
    pub async fn recover(&self) -> Result<RecoveryReport> {
        self.recovery
            .recover_started_jobs()
            .await
            .context("恢复定时任务失败")
    }

    /// 运行直到收到关闭信号
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，节点: {}", self.node_id);

        let listener = self
            .channel
            .as_ref()
            .map(|channel| channel.start_listener(shutdown_rx.resubscribe()));

        match self.recover().await {
            Ok(report) if !report.failed.is_empty() => {
                warn!("{} 个任务恢复失败，已标记为 FAILED", report.failed.len());
            }
            Ok(_) => {}
            Err(e) => error!("{:#}", e),
        }

        let _ = shutdown_rx.recv().await;
        info!("应用程序收到关闭信号");

        self.scheduler.shutdown().await;
        self.dispatcher_handle.join().await;
        if let Some(listener) = listener {
            if let Err(e) = listener.await {
                warn!("失效通知监听异常退出: {}", e);
            }
        }
        self.registry.close_all().await;
        self.database.close().await;

        info!("应用程序已停止");
        Ok(())
    }
}

fn resolve_node_id(config: &AppConfig) -> String {
    if !config.node.node_id.trim().is_empty() {
        return config.node.node_id.trim().to_string();
    }
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());
    format!("{}-{}", host, std::process::id())
}
