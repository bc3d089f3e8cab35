use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use hub_core::{
    models::{
        validate_name, Actor, ConnectionParams, ConnectionSpec, DataSourceConfig, Dialect, EntityKind,
        Permission, QueryColumn, SourceCreate, SourceDetail, SourceType, SourceUpdate, TableInfo,
        UploadMode, UploadRequest, UploadRow,
    },
    security::CredentialCodec,
    traits::{DataSourceRepository, DataStorePool, PermissionGate},
    HubError, HubResult,
};
use hub_infrastructure::StructuredLogger;
use hub_registry::ConnectionPoolRegistry;
use tracing::{debug, info, instrument, warn};

use crate::interfaces::{SourceConnectionService, SourceMetadataService, SourceService, SourceUploadService};
use crate::services::{InvalidationMode, NameGuard};

/// 每条插入语句的行数上限，列数较多时按绑定参数上限缩小
pub const UPLOAD_BATCH_SIZE: usize = 1000;
/// 同时执行的插入批次上限
pub const UPLOAD_CONCURRENCY: usize = 8;

/// 数据源用例实现
pub struct SourceManager {
    repo: Arc<dyn DataSourceRepository>,
    registry: Arc<ConnectionPoolRegistry>,
    codec: Arc<CredentialCodec>,
    permissions: Arc<dyn PermissionGate>,
    name_guard: Arc<NameGuard>,
    invalidation: InvalidationMode,
}

impl SourceManager {
    pub fn new(
        repo: Arc<dyn DataSourceRepository>,
        registry: Arc<ConnectionPoolRegistry>,
        codec: Arc<CredentialCodec>,
        permissions: Arc<dyn PermissionGate>,
        name_guard: Arc<NameGuard>,
        invalidation: InvalidationMode,
    ) -> Self {
        Self {
            repo,
            registry,
            codec,
            permissions,
            name_guard,
            invalidation,
        }
    }

    async fn load(&self, id: i64) -> HubResult<DataSourceConfig> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| HubError::not_found("数据源", id))
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
            .check(actor, EntityKind::Source, project_id, entity_id, permission)
            .await
        {
            Ok(())
        } else {
            Err(HubError::unauthorized(format!(
                "用户 {} 没有数据源的 {:?} 权限",
                actor.username, permission
            )))
        }
    }

    fn detail(&self, source: &DataSourceConfig, with_config: bool) -> SourceDetail {
        let config = with_config.then(|| ConnectionParams {
            url: source.url.clone(),
            username: source.username.clone(),
            password: self.codec.decrypt(&source.password),
            version: source.version.clone(),
            ext: source.ext,
            properties: source.properties.clone(),
        });
        SourceDetail {
            id: source.id,
            project_id: source.project_id,
            name: source.name.clone(),
            description: source.description.clone(),
            source_type: source.source_type,
            config,
            updated_at: source.updated_at,
        }
    }

    fn validate_params(params: &ConnectionParams) -> HubResult<()> {
        params.validate()?;
        Dialect::from_url(&params.url)?;
        Ok(())
    }

    /// 探测连接，失败时移除探测过程中建立的连接池
    async fn probe(&self, spec: &ConnectionSpec) -> HubResult<()> {
        match self.registry.test_connection(spec).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.registry.release(spec).await;
                Err(HubError::connectivity(format!("{} 连接测试失败", spec.label)))
            }
            Err(e) => {
                self.registry.release(spec).await;
                Err(e)
            }
        }
    }

    async fn create_locked(&self, actor: &Actor, request: &SourceCreate, source_type: SourceType) -> HubResult<DataSourceConfig> {
        let name = request.name.trim();
        if self.repo.find_by_name(request.project_id, name).await?.is_some() {
            return Err(HubError::name_conflict(EntityKind::Source, name));
        }

        let now = Utc::now();
        let record = DataSourceConfig {
            id: 0,
            project_id: request.project_id,
            name: name.to_string(),
            description: request.description.clone(),
            source_type,
            url: request.config.url.trim().to_string(),
            username: request.config.username.clone(),
            password: self.codec.encrypt(&request.config.password)?,
            version: request.config.version.clone(),
            ext: request.config.ext,
            properties: request.config.properties.clone(),
            created_by: actor.user_id,
            created_at: now,
            updated_by: None,
            updated_at: now,
        };
        let created = self.repo.create(&record).await?;

        // 连接池标签含ID，写入后才能探测；探测失败回滚记录
        if let Err(e) = self.probe(&created.connection_spec(&self.codec)).await {
            if let Err(delete_err) = self.repo.delete(created.id).await {
                warn!("回滚数据源 {} 失败: {}", created.id, delete_err);
            }
            return Err(e);
        }
        Ok(created)
    }

    async fn update_locked(
        &self,
        actor: &Actor,
        existing: &DataSourceConfig,
        request: &SourceUpdate,
        renamed: bool,
    ) -> HubResult<DataSourceConfig> {
        let name = request.name.trim();
        if renamed {
            if let Some(other) = self.repo.find_by_name(existing.project_id, name).await? {
                if other.id != existing.id {
                    return Err(HubError::name_conflict(EntityKind::Source, name));
                }
            }
        }

        let mut updated = existing.clone();
        updated.name = name.to_string();
        updated.description = request.description.clone();
        updated.url = request.config.url.trim().to_string();
        updated.username = request.config.username.clone();
        updated.password = self.codec.encrypt(&request.config.password)?;
        updated.version = request.config.version.clone();
        updated.ext = request.config.ext;
        updated.properties = request.config.properties.clone();
        updated.updated_by = Some(actor.user_id);
        updated.updated_at = Utc::now();

        let old_fingerprint = existing.connection_spec(&self.codec).fingerprint();
        let new_spec = updated.connection_spec(&self.codec);
        self.probe(&new_spec).await?;

        // 旧连接池先在集群内失效，再写入新字段
        if old_fingerprint != new_spec.fingerprint() {
            self.invalidation.release_source(&self.registry, &old_fingerprint).await;
        }
        if let Err(e) = self.repo.update(&updated).await {
            // 新字段没有落库，不能留下它的连接池
            if old_fingerprint != new_spec.fingerprint() {
                self.registry.release(&new_spec).await;
            }
            return Err(e);
        }
        Ok(updated)
    }

    fn check_mode(mode: UploadMode, exists: bool, table: &str) -> HubResult<()> {
        match mode {
            UploadMode::New if exists => Err(HubError::validation(format!("表 {table} 已存在"))),
            UploadMode::Replace | UploadMode::Append if !exists => {
                Err(HubError::validation(format!("表 {table} 不存在")))
            }
            _ => Ok(()),
        }
    }

    async fn prepare_table(pool: &Arc<dyn DataStorePool>, request: &UploadRequest, table: &str) -> HubResult<()> {
        let dialect = pool.dialect();
        match request.mode {
            UploadMode::New => {
                pool.execute(&dialect.create_table_sql(table, &request.columns, &request.primary_keys), &[])
                    .await?;
            }
            UploadMode::Replace => {
                pool.execute(&dialect.truncate_sql(table), &[]).await?;
            }
            UploadMode::Append => {}
            UploadMode::Cover => {
                pool.execute(&dialect.drop_table_sql(table), &[]).await?;
                pool.execute(&dialect.create_table_sql(table, &request.columns, &request.primary_keys), &[])
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SourceService for SourceManager {
    #[instrument(skip(self, request), fields(project_id = request.project_id, name = %request.name))]
    async fn create_source(&self, actor: &Actor, request: SourceCreate) -> HubResult<DataSourceConfig> {
        validate_name(&request.name)?;
        let source_type = SourceType::parse(&request.source_type)?;
        Self::validate_params(&request.config)?;
        self.authorize(actor, request.project_id, None, Permission::Write).await?;

        let name = request.name.trim();
        if self.repo.find_by_name(request.project_id, name).await?.is_some() {
            return Err(HubError::name_conflict(EntityKind::Source, name));
        }

        let reservation = self.name_guard.reserve(EntityKind::Source, request.project_id, name).await?;
        let result = self.create_locked(actor, &request, source_type).await;
        reservation.release().await;

        let created = result?;
        StructuredLogger::log_operation("source", created.id, "create", actor.user_id);
        Ok(created)
    }

    #[instrument(skip(self, request), fields(source_id = request.id))]
    async fn update_source(&self, actor: &Actor, request: SourceUpdate) -> HubResult<DataSourceConfig> {
        let existing = self.load(request.id).await?;
        self.authorize(actor, existing.project_id, Some(existing.id), Permission::Write)
            .await?;
        validate_name(&request.name)?;
        Self::validate_params(&request.config)?;

        let name = request.name.trim();
        let renamed = existing.name != name;
        if renamed {
            if let Some(other) = self.repo.find_by_name(existing.project_id, name).await? {
                if other.id != existing.id {
                    return Err(HubError::name_conflict(EntityKind::Source, name));
                }
            }
        }

        let reservation = if renamed {
            Some(self.name_guard.reserve(EntityKind::Source, existing.project_id, name).await?)
        } else {
            None
        };
        let result = self.update_locked(actor, &existing, &request, renamed).await;
        if let Some(reservation) = reservation {
            reservation.release().await;
        }

        let updated = result?;
        StructuredLogger::log_operation("source", updated.id, "update", actor.user_id);
        Ok(updated)
    }

    async fn delete_source(&self, actor: &Actor, id: i64) -> HubResult<()> {
        let existing = self.load(id).await?;
        self.authorize(actor, existing.project_id, Some(id), Permission::Write)
            .await?;

        self.repo.delete(id).await?;
        let fingerprint = existing.connection_spec(&self.codec).fingerprint();
        self.invalidation.release_source(&self.registry, &fingerprint).await;

        StructuredLogger::log_operation("source", id, "delete", actor.user_id);
        Ok(())
    }

    async fn get_source_detail(&self, actor: &Actor, id: i64) -> HubResult<SourceDetail> {
        let source = self.load(id).await?;
        self.authorize(actor, source.project_id, Some(id), Permission::Read).await?;

        let with_config = self
            .permissions
            .check(actor, EntityKind::Source, source.project_id, Some(id), Permission::ReadConfig)
            .await;
        Ok(self.detail(&source, with_config))
    }

    async fn list_sources(&self, actor: &Actor, project_id: i64) -> HubResult<Vec<SourceDetail>> {
        self.authorize(actor, project_id, None, Permission::Read).await?;
        let with_config = self
            .permissions
            .check(actor, EntityKind::Source, project_id, None, Permission::ReadConfig)
            .await;

        let sources = self.repo.list_by_project(project_id).await?;
        Ok(sources.iter().map(|s| self.detail(s, with_config)).collect())
    }
}

#[async_trait]
impl SourceConnectionService for SourceManager {
    async fn test_connection(&self, actor: &Actor, id: i64) -> HubResult<bool> {
        let source = self.load(id).await?;
        self.authorize(actor, source.project_id, Some(id), Permission::Read).await?;
        self.registry.test_connection(&source.connection_spec(&self.codec)).await
    }

    async fn test_source(&self, actor: &Actor, project_id: i64, params: ConnectionParams) -> HubResult<()> {
        self.authorize(actor, project_id, None, Permission::Write).await?;
        Self::validate_params(&params)?;

        // 未保存的参数只做一次性探测，不保留连接池
        let spec = ConnectionSpec::new(format!("test@{project_id}"), &params);
        let result = self.probe(&spec).await;
        self.registry.release(&spec).await;
        result
    }

    async fn reconnect(&self, actor: &Actor, id: i64, db_user: &str, db_password: &str) -> HubResult<bool> {
        let source = self.load(id).await?;
        self.authorize(actor, source.project_id, Some(id), Permission::Write)
            .await?;

        if source.username != db_user || self.codec.decrypt(&source.password) != db_password {
            return Err(HubError::validation("数据源用户名或密码错误"));
        }

        let spec = source.connection_spec(&self.codec);
        self.registry.release(&spec).await;
        self.invalidation.release_source(&self.registry, &spec.fingerprint()).await;
        info!("数据源 {} 重新连接", spec.label);

        self.registry.test_connection(&spec).await
    }
}

#[async_trait]
impl SourceMetadataService for SourceManager {
    async fn get_databases(&self, actor: &Actor, id: i64) -> HubResult<Vec<String>> {
        let source = self.load(id).await?;
        self.authorize(actor, source.project_id, Some(id), Permission::Read).await?;
        let handle = self.registry.acquire(&source.connection_spec(&self.codec)).await?;
        handle.pool().databases().await
    }

    async fn get_tables(&self, actor: &Actor, id: i64, database: &str) -> HubResult<Vec<QueryColumn>> {
        let source = self.load(id).await?;
        self.authorize(actor, source.project_id, Some(id), Permission::Read).await?;
        let handle = self.registry.acquire(&source.connection_spec(&self.codec)).await?;
        handle.pool().tables(database).await
    }

    async fn get_columns(&self, actor: &Actor, id: i64, database: &str, table: &str) -> HubResult<TableInfo> {
        let source = self.load(id).await?;
        self.authorize(actor, source.project_id, Some(id), Permission::Read).await?;
        let handle = self.registry.acquire(&source.connection_spec(&self.codec)).await?;
        handle.pool().columns(database, table).await
    }
}

#[async_trait]
impl SourceUploadService for SourceManager {
    async fn validate_upload(&self, actor: &Actor, id: i64, table: &str, mode: UploadMode) -> HubResult<()> {
        let source = self.load(id).await?;
        self.authorize(actor, source.project_id, Some(id), Permission::Write)
            .await?;
        let table = table.trim();
        if table.is_empty() {
            return Err(HubError::validation("表名不能为空"));
        }

        let handle = self.registry.acquire(&source.connection_spec(&self.codec)).await?;
        let exists = handle.pool().table_exists(table).await?;
        Self::check_mode(mode, exists, table)
    }

    #[instrument(skip(self, request, rows), fields(source_id = id, table = %request.table_name, rows = rows.len()))]
    async fn upload_rows(
        &self,
        actor: &Actor,
        id: i64,
        request: UploadRequest,
        rows: Vec<UploadRow>,
    ) -> HubResult<u64> {
        request.validate()?;
        let width = request.columns.len();
        if let Some(position) = rows.iter().position(|row| row.len() != width) {
            return Err(HubError::validation(format!(
                "第 {} 行字段数与表头不一致",
                position + 1
            )));
        }

        let source = self.load(id).await?;
        self.authorize(actor, source.project_id, Some(id), Permission::Write)
            .await?;

        let handle = self.registry.acquire(&source.connection_spec(&self.codec)).await?;
        let pool = handle.pool().clone();
        let table = request.table_name.trim();

        let exists = pool.table_exists(table).await?;
        Self::check_mode(request.mode, exists, table)?;
        Self::prepare_table(&pool, &request, table).await?;

        let dialect = pool.dialect();
        let batch_rows = dialect.insert_batch_rows(width, UPLOAD_BATCH_SIZE);
        let batches: Vec<(String, Vec<Option<String>>)> = rows
            .chunks(batch_rows)
            .map(|chunk| {
                let sql = dialect.insert_sql(table, &request.columns, chunk.len());
                let params = chunk.iter().flat_map(|row| row.iter().cloned()).collect();
                (sql, params)
            })
            .collect();

        let insert_pool = pool.clone();
        let results: Vec<HubResult<u64>> = stream::iter(batches)
            .map(move |(sql, params)| {
                let pool = insert_pool.clone();
                async move { pool.execute(&sql, &params).await }
            })
            .buffer_unordered(UPLOAD_CONCURRENCY)
            .collect()
            .await;

        if let Some(e) = results.into_iter().find_map(Result::err) {
            // 本次新建的表不保留半截数据
            if matches!(request.mode, UploadMode::New | UploadMode::Cover) {
                if let Err(drop_err) = pool.execute(&dialect.drop_table_sql(table), &[]).await {
                    warn!("清理上传失败的表 {} 出错: {}", table, drop_err);
                }
            }
            return Err(e);
        }

        debug!("写入 {} 行到 {}.{}", rows.len(), source.name, table);
        StructuredLogger::log_operation("source", id, "upload", actor.user_id);
        Ok(rows.len() as u64)
    }
}
