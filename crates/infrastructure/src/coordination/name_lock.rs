use hub_core::{
    models::{EntityKind, LockKey},
    traits::CoordinationStore,
    HubResult,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::observability::MetricsCollector;

/// 加锁结果
pub enum LockOutcome {
    /// 成功持有锁
    Locked(LockGuard),
    /// 锁已被其他持有者占用
    Contended,
    /// 协调存储不可达，无法判断
    Unsupported(String),
}

impl LockOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            LockOutcome::Locked(_) => "locked",
            LockOutcome::Contended => "contended",
            LockOutcome::Unsupported(_) => "unsupported",
        }
    }
}

impl fmt::Debug for LockOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockOutcome::Locked(guard) => f.debug_tuple("Locked").field(&guard.key).finish(),
            LockOutcome::Contended => f.write_str("Contended"),
            LockOutcome::Unsupported(reason) => f.debug_tuple("Unsupported").field(reason).finish(),
        }
    }
}

/// 锁持有凭证
///
/// 调用 [`LockGuard::release`] 释放；未释放就被丢弃时尽力在后台释放。
/// 调用 [`LockGuard::retain_until_expiry`] 则保留到过期时间。
pub struct LockGuard {
    store: Arc<dyn CoordinationStore>,
    key: String,
    token: String,
    done: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn release(mut self) -> HubResult<bool> {
        self.done = true;
        let released = self.store.delete_if_match(&self.key, &self.token).await?;
        debug!("Lock {} released: {}", self.key, released);
        Ok(released)
    }

    /// 不主动释放，锁在TTL到期后自然失效
    pub fn retain_until_expiry(mut self) {
        self.done = true;
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        handle.spawn(async move {
            if let Err(e) = store.delete_if_match(&key, &token).await {
                warn!("Failed to release dropped lock {}: {}", key, e);
            }
        });
    }
}

/// 分布式名称锁
///
/// 基于协调存储的原子"不存在才写入"加过期时间实现，锁值为随机令牌，
/// 释放时只删除自己持有的锁。
#[derive(Clone)]
pub struct DistributedNameLock {
    store: Arc<dyn CoordinationStore>,
    key_prefix: String,
    metrics: Option<Arc<MetricsCollector>>,
}

impl DistributedNameLock {
    pub fn new(store: Arc<dyn CoordinationStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 按 (实体类型, 名称, 作用域) 加名称锁
    pub async fn acquire_name(
        &self,
        kind: EntityKind,
        name: &str,
        scope: i64,
        ttl: Duration,
    ) -> LockOutcome {
        self.acquire(LockKey::for_name(kind, scope, name), ttl).await
    }

    pub async fn acquire(&self, key: LockKey, ttl: Duration) -> LockOutcome {
        let key = key.with_prefix(&self.key_prefix).as_str().to_string();
        let token = Uuid::new_v4().to_string();

        let outcome = match self.store.set_if_absent(&key, &token, ttl).await {
            Ok(true) => {
                debug!("Lock {} acquired for {:?}", key, ttl);
                LockOutcome::Locked(LockGuard {
                    store: self.store.clone(),
                    key,
                    token,
                    done: false,
                })
            }
            Ok(false) => {
                debug!("Lock {} is held by another owner", key);
                LockOutcome::Contended
            }
            Err(e) => {
                warn!("Lock {} unsupported, coordination store unavailable: {}", key, e);
                LockOutcome::Unsupported(e.to_string())
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_lock_acquisition(outcome.label());
        }
        outcome
    }
}
