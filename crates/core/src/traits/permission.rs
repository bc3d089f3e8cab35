use async_trait::async_trait;

use crate::models::{Actor, EntityKind, Permission};

/// 权限判定，由外部权限服务实现，这里只消费布尔结果
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn check(
        &self,
        actor: &Actor,
        kind: EntityKind,
        project_id: i64,
        entity_id: Option<i64>,
        permission: Permission,
    ) -> bool;
}
