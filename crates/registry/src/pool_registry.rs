use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hub_core::{
    models::ConnectionSpec,
    security::Fingerprint,
    traits::{DataStoreDriver, DataStorePool, DataStorePoolOptions},
    HubError, HubResult,
};
use hub_infrastructure::MetricsCollector;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// 注册中心持有的一个连接池
pub struct PooledConnection {
    label: String,
    fingerprint: Fingerprint,
    pool: Arc<dyn DataStorePool>,
    created_at: DateTime<Utc>,
    ref_count: AtomicUsize,
    closed: AtomicBool,
}

impl PooledConnection {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 当前存活的句柄数量
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 只关闭一次，返回本次调用是否真正执行了关闭
    async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.pool.close().await;
        true
    }
}

/// 连接池句柄
///
/// 调用方只通过句柄使用连接池，句柄丢弃时引用计数减一。
pub struct ConnectionHandle {
    inner: Arc<PooledConnection>,
}

impl ConnectionHandle {
    fn new(inner: Arc<PooledConnection>) -> Self {
        inner.ref_count.fetch_add(1, Ordering::SeqCst);
        Self { inner }
    }

    pub fn pool(&self) -> &Arc<dyn DataStorePool> {
        &self.inner.pool
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.inner.fingerprint
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn ref_count(&self) -> usize {
        self.inner.ref_count()
    }
}

impl Clone for ConnectionHandle {
    fn clone(&self) -> Self {
        Self::new(self.inner.clone())
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.inner.ref_count.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("label", &self.inner.label)
            .field("fingerprint", &self.inner.fingerprint.short())
            .field("created_at", &self.inner.created_at)
            .finish()
    }
}

type Slot = Arc<OnceCell<Arc<PooledConnection>>>;

/// 连接池注册中心
///
/// 以连接指纹为键。每个键对应一个 `OnceCell` 槽位，并发的 `acquire`
/// 共享同一次建池过程；不同指纹之间互不阻塞。
pub struct ConnectionPoolRegistry {
    driver: Arc<dyn DataStoreDriver>,
    options: DataStorePoolOptions,
    pools: DashMap<Fingerprint, Slot>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ConnectionPoolRegistry {
    pub fn new(driver: Arc<dyn DataStoreDriver>, options: DataStorePoolOptions) -> Self {
        Self {
            driver,
            options,
            pools: DashMap::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.options.connect_timeout
    }

    /// 获取连接池句柄，不存在时建立
    ///
    /// 建池受连接超时约束，失败返回 `ConnectivityFailure`，且不会留下空槽位。
    /// 建池期间槽位被 `release` 移除时，新建的连接池会被关闭并在新槽位上重建，
    /// 调用方拿到的总是仍登记在注册中心里的连接池。
    pub async fn acquire(&self, spec: &ConnectionSpec) -> HubResult<ConnectionHandle> {
        let fingerprint = spec.fingerprint();
        loop {
            let slot = self
                .pools
                .entry(fingerprint.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();

            let connection = match slot
                .get_or_try_init(|| self.create_pool(spec, fingerprint.clone()))
                .await
                .cloned()
            {
                Ok(connection) => connection,
                Err(e) => {
                    self.pools
                        .remove_if(&fingerprint, |_, current| Arc::ptr_eq(current, &slot) && current.get().is_none());
                    return Err(e);
                }
            };

            let registered = self
                .pools
                .get(&fingerprint)
                .map(|current| Arc::ptr_eq(current.value(), &slot))
                .unwrap_or(false);
            if registered {
                return Ok(ConnectionHandle::new(connection));
            }

            // 建池期间已被释放
            if connection.close().await {
                if let Some(metrics) = &self.metrics {
                    metrics.record_pool_evicted();
                }
                warn!("连接池在建立期间已被释放，重新建立: {}", connection.label);
            }
        }
    }

    async fn create_pool(&self, spec: &ConnectionSpec, fingerprint: Fingerprint) -> HubResult<Arc<PooledConnection>> {
        debug!("建立外部数据源连接池: {} ({})", spec.label, fingerprint.short());
        let started = Instant::now();

        let pool = tokio::time::timeout(self.options.connect_timeout, self.driver.open(spec, &self.options))
            .await
            .map_err(|_| {
                HubError::connectivity(format!(
                    "{}: 连接超时({}秒)",
                    spec.label,
                    self.options.connect_timeout.as_secs_f64()
                ))
            })??;

        let elapsed = started.elapsed().as_secs_f64();
        if let Some(metrics) = &self.metrics {
            metrics.record_pool_created(elapsed);
            metrics.update_active_pools(self.pools.len());
        }
        info!("外部数据源连接池已建立: {}, 耗时 {:.3}s", spec.label, elapsed);

        Ok(Arc::new(PooledConnection {
            label: spec.label.clone(),
            fingerprint,
            pool,
            created_at: Utc::now(),
            ref_count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }))
    }

    /// 移除并关闭连接池，不存在时不做任何事
    pub async fn release(&self, spec: &ConnectionSpec) -> bool {
        self.release_fingerprint(&spec.fingerprint()).await
    }

    pub async fn release_fingerprint(&self, fingerprint: &Fingerprint) -> bool {
        let Some((_, slot)) = self.pools.remove(fingerprint) else {
            debug!("连接池不存在，无需释放: {}", fingerprint.short());
            return false;
        };

        if let Some(metrics) = &self.metrics {
            metrics.update_active_pools(self.pools.len());
        }

        match slot.get() {
            Some(connection) => {
                if connection.ref_count() > 0 {
                    warn!(
                        "释放仍在使用中的连接池: {} (句柄数 {})",
                        connection.label,
                        connection.ref_count()
                    );
                }
                if connection.close().await {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_pool_evicted();
                    }
                    info!("外部数据源连接池已释放: {}", connection.label);
                }
                true
            }
            None => {
                debug!("连接池仍在建立中，建立完成后由获取方关闭: {}", fingerprint.short());
                false
            }
        }
    }

    /// 获取连接并做轻量存活探测
    ///
    /// 连接失败返回 `Ok(false)`；参数本身不合法时返回错误。
    pub async fn test_connection(&self, spec: &ConnectionSpec) -> HubResult<bool> {
        let handle = match self.acquire(spec).await {
            Ok(handle) => handle,
            Err(HubError::ConnectivityFailure(reason)) => {
                warn!("数据源连接测试失败: {}, {}", spec.label, reason);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        match handle.pool().ping().await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("数据源存活探测失败: {}, {}", spec.label, e);
                Ok(false)
            }
        }
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.pools
            .get(fingerprint)
            .map(|slot| slot.get().is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.pools.iter().filter(|entry| entry.value().get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 关闭全部连接池，用于进程退出
    pub async fn close_all(&self) {
        let fingerprints: Vec<Fingerprint> = self.pools.iter().map(|entry| entry.key().clone()).collect();
        for fingerprint in fingerprints {
            self.release_fingerprint(&fingerprint).await;
        }
    }
}
