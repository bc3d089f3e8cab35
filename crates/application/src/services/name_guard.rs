use std::time::Duration;

use hub_core::{config::LockFallback, models::EntityKind, HubError, HubResult};
use hub_infrastructure::{DistributedNameLock, LockGuard, LockOutcome};
use tracing::warn;

/// 名称唯一性保护
///
/// 创建与改名流程：检查 → [`NameGuard::reserve`] → 复查 → 写入 → [`NameReservation::release`]。
pub struct NameGuard {
    lock: DistributedNameLock,
    ttl: Duration,
    fallback: LockFallback,
}

/// 已占用的名称，写入完成后释放
#[must_use]
pub struct NameReservation {
    guard: Option<LockGuard>,
}

impl NameReservation {
    pub async fn release(self) {
        if let Some(guard) = self.guard {
            let key = guard.key().to_string();
            if let Err(e) = guard.release().await {
                warn!("释放名称锁 {} 失败，等待过期: {}", key, e);
            }
        }
    }

    /// 协调存储不可用、按单节点模式放行时为 false
    pub fn is_locked(&self) -> bool {
        self.guard.is_some()
    }
}

impl NameGuard {
    pub fn new(lock: DistributedNameLock, ttl: Duration, fallback: LockFallback) -> Self {
        Self { lock, ttl, fallback }
    }

    pub async fn reserve(&self, kind: EntityKind, scope: i64, name: &str) -> HubResult<NameReservation> {
        match self.lock.acquire_name(kind, name, scope, self.ttl).await {
            LockOutcome::Locked(guard) => Ok(NameReservation { guard: Some(guard) }),
            LockOutcome::Contended => Err(HubError::name_conflict(kind, name)),
            LockOutcome::Unsupported(reason) => match self.fallback {
                LockFallback::Proceed => {
                    warn!(
                        "名称锁不可用，按单节点模式继续: {} `{}` (project {}): {}",
                        kind, name, scope, reason
                    );
                    Ok(NameReservation { guard: None })
                }
                LockFallback::Reject => Err(HubError::coordination(reason)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_infrastructure::InMemoryCoordinationStore;
    use std::sync::Arc;

    fn guard(store: &InMemoryCoordinationStore, fallback: LockFallback) -> NameGuard {
        NameGuard::new(
            DistributedNameLock::new(Arc::new(store.clone()), "hub:"),
            Duration::from_secs(10),
            fallback,
        )
    }

    #[tokio::test]
    async fn test_contended_name_is_conflict() {
        let store = InMemoryCoordinationStore::new();
        let guard = guard(&store, LockFallback::Proceed);

        let first = guard.reserve(EntityKind::Source, 1, "pg1").await.unwrap();
        assert!(first.is_locked());
        let err = guard.reserve(EntityKind::Source, 1, "pg1").await.err().unwrap();
        assert!(matches!(err, HubError::NameConflict { .. }));

        first.release().await;
        guard.reserve(EntityKind::Source, 1, "pg1").await.unwrap().release().await;
    }

    #[tokio::test]
    async fn test_fallback_policy() {
        let store = InMemoryCoordinationStore::new();
        store.set_available(false);

        let reservation = guard(&store, LockFallback::Proceed)
            .reserve(EntityKind::CronJob, 1, "daily")
            .await
            .unwrap();
        assert!(!reservation.is_locked());

        let err = guard(&store, LockFallback::Reject)
            .reserve(EntityKind::CronJob, 1, "daily")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HubError::CoordinationUnavailable(_)));
    }
}
