use std::sync::Arc;
use std::time::Duration;

use hub_application::{
    InvalidationMode, NameGuard, SourceConnectionService, SourceManager, SourceMetadataService, SourceService,
    SourceUploadService,
};
use hub_core::{
    config::LockFallback,
    models::{Actor, ConnectionParams, QueryColumn, SourceCreate, SourceUpdate, UploadMode, UploadRequest, UploadRow},
    traits::{DataStoreDriver, DataStorePoolOptions, PermissionGate},
    HubError,
};
use hub_infrastructure::{DistributedNameLock, InMemoryCoordinationStore, SqlxDataStoreDriver};
use hub_registry::ConnectionPoolRegistry;
use hub_testing_utils::{MockDataSourceRepository, MockDataStoreDriver, StaticPermissionGate, TestEnv};

struct Node {
    manager: SourceManager,
    registry: Arc<ConnectionPoolRegistry>,
}

fn node(
    repo: &MockDataSourceRepository,
    driver: &MockDataStoreDriver,
    store: &InMemoryCoordinationStore,
    gate: StaticPermissionGate,
) -> Node {
    node_with_driver(repo, Arc::new(driver.clone()), store, gate)
}

fn node_with_driver(
    repo: &MockDataSourceRepository,
    driver: Arc<dyn DataStoreDriver>,
    store: &InMemoryCoordinationStore,
    gate: StaticPermissionGate,
) -> Node {
    let registry = Arc::new(ConnectionPoolRegistry::new(driver, DataStorePoolOptions::default()));
    let name_guard = NameGuard::new(
        DistributedNameLock::new(Arc::new(store.clone()), "hub:"),
        Duration::from_secs(10),
        LockFallback::Proceed,
    );
    let permissions: Arc<dyn PermissionGate> = Arc::new(gate);
    let manager = SourceManager::new(
        Arc::new(repo.clone()),
        registry.clone(),
        Arc::new(TestEnv::codec()),
        permissions,
        Arc::new(name_guard),
        InvalidationMode::Local,
    );
    Node { manager, registry }
}

fn params(password: &str) -> ConnectionParams {
    ConnectionParams {
        url: "jdbc:postgresql://db.internal:5432/analytics".to_string(),
        username: "reader".to_string(),
        password: password.to_string(),
        ..Default::default()
    }
}

fn create_request(name: &str) -> SourceCreate {
    SourceCreate {
        project_id: 7,
        name: name.to_string(),
        description: Some("报表库".to_string()),
        source_type: "jdbc".to_string(),
        config: params("s3cret"),
    }
}

fn admin() -> Actor {
    Actor::new(42, "alice")
}

#[tokio::test]
async fn test_concurrent_create_same_name_single_winner() {
    TestEnv::init_logging();
    let repo = MockDataSourceRepository::new().with_write_delay(Duration::from_millis(100));
    let driver = MockDataStoreDriver::new();
    let store = InMemoryCoordinationStore::new();
    let node_a = node(&repo, &driver, &store, StaticPermissionGate::allow_all());
    let node_b = node(&repo, &driver, &store, StaticPermissionGate::allow_all());

    let actor = admin();
    let (a, b) = tokio::join!(
        node_a.manager.create_source(&actor, create_request("pg1")),
        node_b.manager.create_source(&actor, create_request("pg1")),
    );

    let results = [a, b];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(HubError::NameConflict { .. }))));
    assert_eq!(repo.count(), 1);
}

#[tokio::test]
async fn test_create_rolls_back_when_unreachable() {
    let repo = MockDataSourceRepository::new();
    let driver = MockDataStoreDriver::new().with_ping_failure();
    let node = node(&repo, &driver, &InMemoryCoordinationStore::new(), StaticPermissionGate::allow_all());

    let err = node
        .manager
        .create_source(&admin(), create_request("pg1"))
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::ConnectivityFailure(_)));
    assert_eq!(repo.count(), 0);
    assert!(node.registry.is_empty());
}

#[tokio::test]
async fn test_create_validates_before_writing() {
    let repo = MockDataSourceRepository::new();
    let driver = MockDataStoreDriver::new();
    let node = node(&repo, &driver, &InMemoryCoordinationStore::new(), StaticPermissionGate::allow_all());

    let mut request = create_request("  ");
    let err = node.manager.create_source(&admin(), request.clone()).await.unwrap_err();
    assert!(matches!(err, HubError::Validation(_)));

    request.name = "pg1".to_string();
    request.source_type = "oracle-ish".to_string();
    let err = node.manager.create_source(&admin(), request.clone()).await.unwrap_err();
    assert!(matches!(err, HubError::Validation(_)));

    request.source_type = "jdbc".to_string();
    request.config.url = "ftp://somewhere".to_string();
    let err = node.manager.create_source(&admin(), request).await.unwrap_err();
    assert!(matches!(err, HubError::Validation(_)));

    assert_eq!(repo.count(), 0);
    assert_eq!(driver.open_count(), 0);
}

#[tokio::test]
async fn test_secret_change_replaces_cached_pool() {
    let repo = MockDataSourceRepository::new();
    let driver = MockDataStoreDriver::new();
    let node = node(&repo, &driver, &InMemoryCoordinationStore::new(), StaticPermissionGate::allow_all());
    let actor = admin();

    let created = node.manager.create_source(&actor, create_request("pg1")).await.unwrap();
    node.manager.get_databases(&actor, created.id).await.unwrap();
    assert_eq!(driver.open_count(), 1);
    assert_eq!(node.registry.len(), 1);

    let update = SourceUpdate {
        id: created.id,
        name: "pg1".to_string(),
        description: None,
        config: params("rotated"),
    };
    node.manager.update_source(&actor, update).await.unwrap();

    // 旧指纹的连接池已释放，只剩新密码建立的连接池
    assert_eq!(node.registry.len(), 1);
    assert_eq!(driver.closed_count(), 1);

    let databases = node.manager.get_databases(&actor, created.id).await.unwrap();
    assert_eq!(databases, vec!["analytics".to_string()]);
    assert_eq!(driver.open_count(), 2);
    assert_eq!(driver.secrets().last().map(String::as_str), Some("rotated"));
}

#[tokio::test]
async fn test_failed_update_drops_pool_for_unsaved_fields() {
    let repo = MockDataSourceRepository::new();
    let driver = MockDataStoreDriver::new();
    let node = node(&repo, &driver, &InMemoryCoordinationStore::new(), StaticPermissionGate::allow_all());
    let actor = admin();

    let created = node.manager.create_source(&actor, create_request("pg1")).await.unwrap();
    repo.set_update_failure(true);

    let update = SourceUpdate {
        id: created.id,
        name: "pg1".to_string(),
        description: None,
        config: params("rotated"),
    };
    let err = node.manager.update_source(&actor, update).await.unwrap_err();
    assert!(matches!(err, HubError::Internal(_)));

    // 记录仍是旧密码，注册中心里不能留着新密码的连接池
    assert!(node.registry.is_empty());
    assert_eq!(driver.open_count(), 2);
    assert_eq!(driver.closed_count(), 2);

    repo.set_update_failure(false);
    node.manager.get_databases(&actor, created.id).await.unwrap();
    assert_eq!(driver.secrets().last().map(String::as_str), Some("s3cret"));
}

#[tokio::test]
async fn test_rename_to_taken_name_conflicts() {
    let repo = MockDataSourceRepository::new();
    let driver = MockDataStoreDriver::new();
    let node = node(&repo, &driver, &InMemoryCoordinationStore::new(), StaticPermissionGate::allow_all());
    let actor = admin();

    node.manager.create_source(&actor, create_request("pg1")).await.unwrap();
    let second = node.manager.create_source(&actor, create_request("pg2")).await.unwrap();

    let err = node
        .manager
        .update_source(
            &actor,
            SourceUpdate {
                id: second.id,
                name: "pg1".to_string(),
                description: None,
                config: params("s3cret"),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::NameConflict { .. }));
}

#[tokio::test]
async fn test_detail_hides_config_without_read_config() {
    let repo = MockDataSourceRepository::new();
    let driver = MockDataStoreDriver::new();
    let store = InMemoryCoordinationStore::new();
    let owner = node(&repo, &driver, &store, StaticPermissionGate::allow_all());
    let viewer = node(&repo, &driver, &store, StaticPermissionGate::read_only());

    let created = owner.manager.create_source(&admin(), create_request("pg1")).await.unwrap();
    assert_ne!(created.password, "s3cret");

    let full = owner.manager.get_source_detail(&admin(), created.id).await.unwrap();
    let config = full.config.expect("owner should see config");
    assert_eq!(config.password, "s3cret");
    assert_eq!(config.username, "reader");

    let bob = Actor::new(7, "bob");
    let limited = viewer.manager.get_source_detail(&bob, created.id).await.unwrap();
    assert_eq!(limited.name, "pg1");
    assert!(limited.config.is_none());

    let listed = viewer.manager.list_sources(&bob, 7).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].config.is_none());

    let err = viewer.manager.delete_source(&bob, created.id).await.unwrap_err();
    assert!(matches!(err, HubError::Unauthorized(_)));
}

#[tokio::test]
async fn test_missing_source_is_not_found_before_permission() {
    let repo = MockDataSourceRepository::new();
    let node = node(
        &repo,
        &MockDataStoreDriver::new(),
        &InMemoryCoordinationStore::new(),
        StaticPermissionGate::deny_all(),
    );

    let err = node.manager.get_source_detail(&admin(), 999).await.unwrap_err();
    assert!(matches!(err, HubError::NotFound { .. }));
}

#[tokio::test]
async fn test_delete_releases_pool() {
    let repo = MockDataSourceRepository::new();
    let driver = MockDataStoreDriver::new();
    let node = node(&repo, &driver, &InMemoryCoordinationStore::new(), StaticPermissionGate::allow_all());
    let actor = admin();

    let created = node.manager.create_source(&actor, create_request("pg1")).await.unwrap();
    assert_eq!(node.registry.len(), 1);

    node.manager.delete_source(&actor, created.id).await.unwrap();
    assert!(node.registry.is_empty());
    assert_eq!(repo.count(), 0);
}

#[tokio::test]
async fn test_probe_unsaved_params() {
    let repo = MockDataSourceRepository::new();
    let reachable = node(
        &repo,
        &MockDataStoreDriver::new(),
        &InMemoryCoordinationStore::new(),
        StaticPermissionGate::allow_all(),
    );
    reachable.manager.test_source(&admin(), 7, params("x")).await.unwrap();
    assert!(reachable.registry.is_empty());

    let unreachable = node(
        &repo,
        &MockDataStoreDriver::new().failing(),
        &InMemoryCoordinationStore::new(),
        StaticPermissionGate::allow_all(),
    );
    let err = unreachable.manager.test_source(&admin(), 7, params("x")).await.unwrap_err();
    assert!(matches!(err, HubError::ConnectivityFailure(_)));
    assert!(unreachable.registry.is_empty());
}

#[tokio::test]
async fn test_reconnect_requires_stored_credentials() {
    let repo = MockDataSourceRepository::new();
    let driver = MockDataStoreDriver::new();
    let node = node(&repo, &driver, &InMemoryCoordinationStore::new(), StaticPermissionGate::allow_all());
    let actor = admin();
    let created = node.manager.create_source(&actor, create_request("pg1")).await.unwrap();

    let err = node
        .manager
        .reconnect(&actor, created.id, "reader", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::Validation(_)));

    assert!(node.manager.reconnect(&actor, created.id, "reader", "s3cret").await.unwrap());
    assert_eq!(driver.open_count(), 2);
    assert_eq!(driver.closed_count(), 1);
}

fn upload_request(table: &str, mode: UploadMode) -> UploadRequest {
    UploadRequest {
        table_name: table.to_string(),
        mode,
        columns: vec![QueryColumn::new("id", "INTEGER"), QueryColumn::new("name", "TEXT")],
        primary_keys: vec!["id".to_string()],
    }
}

fn rows(count: usize) -> Vec<UploadRow> {
    (0..count)
        .map(|i| vec![Some(i.to_string()), if i % 10 == 0 { None } else { Some(format!("row-{i}")) }])
        .collect()
}

#[tokio::test]
async fn test_upload_modes() {
    let repo = MockDataSourceRepository::new();
    let driver = MockDataStoreDriver::new().with_table("existing");
    let node = node(&repo, &driver, &InMemoryCoordinationStore::new(), StaticPermissionGate::allow_all());
    let actor = admin();
    let id = node.manager.create_source(&actor, create_request("pg1")).await.unwrap().id;

    let err = node
        .manager
        .validate_upload(&actor, id, "existing", UploadMode::New)
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::Validation(_)));
    let err = node
        .manager
        .validate_upload(&actor, id, "missing", UploadMode::Append)
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::Validation(_)));
    node.manager
        .validate_upload(&actor, id, "missing", UploadMode::Cover)
        .await
        .unwrap();

    // 新建表：2500 行分三批写入
    let written = node
        .manager
        .upload_rows(&actor, id, upload_request("fresh", UploadMode::New), rows(2500))
        .await
        .unwrap();
    assert_eq!(written, 2500);
    assert!(driver.has_table("fresh"));

    let statements = driver.statements();
    let inserts: Vec<usize> = statements
        .iter()
        .filter(|(sql, _)| sql.starts_with("INSERT INTO \"fresh\""))
        .map(|(_, params)| *params)
        .collect();
    assert_eq!(inserts.len(), 3);
    assert_eq!(inserts.iter().sum::<usize>(), 5000);

    node.manager
        .upload_rows(&actor, id, upload_request("existing", UploadMode::Replace), rows(3))
        .await
        .unwrap();
    assert!(driver
        .statements()
        .iter()
        .any(|(sql, _)| sql == "TRUNCATE TABLE \"existing\""));

    node.manager
        .upload_rows(&actor, id, upload_request("existing", UploadMode::Cover), rows(3))
        .await
        .unwrap();
    assert!(driver
        .statements()
        .iter()
        .any(|(sql, _)| sql == "DROP TABLE IF EXISTS \"existing\""));
    assert!(driver.has_table("existing"));
}

#[tokio::test]
async fn test_upload_rejects_ragged_rows() {
    let repo = MockDataSourceRepository::new();
    let driver = MockDataStoreDriver::new();
    let node = node(&repo, &driver, &InMemoryCoordinationStore::new(), StaticPermissionGate::allow_all());
    let actor = admin();
    let id = node.manager.create_source(&actor, create_request("pg1")).await.unwrap().id;

    let mut data = rows(3);
    data[1].pop();
    let err = node
        .manager
        .upload_rows(&actor, id, upload_request("fresh", UploadMode::New), data)
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::Validation(_)));
    assert!(!driver.has_table("fresh"));
}

fn sqlite_source(dir: &tempfile::TempDir) -> SourceCreate {
    SourceCreate {
        project_id: 7,
        name: "local".to_string(),
        description: None,
        source_type: "jdbc".to_string(),
        config: ConnectionParams {
            url: format!("sqlite:{}?mode=rwc", dir.path().join("ext.db").display()),
            ..Default::default()
        },
    }
}

fn wide_request(table: &str, mode: UploadMode, width: usize) -> UploadRequest {
    UploadRequest {
        table_name: table.to_string(),
        mode,
        columns: (0..width).map(|i| QueryColumn::new(format!("c{i}"), "TEXT")).collect(),
        primary_keys: vec!["c0".to_string()],
    }
}

fn wide_rows(count: usize, width: usize) -> Vec<UploadRow> {
    (0..count)
        .map(|r| (0..width).map(|c| Some(format!("{r}-{c}"))).collect())
        .collect()
}

#[tokio::test]
async fn test_wide_upload_stays_under_bind_limit() {
    let dir = tempfile::tempdir().unwrap();
    let repo = MockDataSourceRepository::new();
    let node = node_with_driver(
        &repo,
        Arc::new(SqlxDataStoreDriver::new()),
        &InMemoryCoordinationStore::new(),
        StaticPermissionGate::allow_all(),
    );
    let actor = admin();
    let id = node.manager.create_source(&actor, sqlite_source(&dir)).await.unwrap().id;

    let written = node
        .manager
        .upload_rows(&actor, id, wide_request("wide", UploadMode::New, 40), wide_rows(1000, 40))
        .await
        .unwrap();
    assert_eq!(written, 1000);

    let info = node.manager.get_columns(&actor, id, "main", "wide").await.unwrap();
    assert_eq!(info.columns.len(), 40);

    // 清空表时返回的影响行数就是实际写入的行数
    let spec = repo.all()[0].connection_spec(&TestEnv::codec());
    let handle = node.registry.acquire(&spec).await.unwrap();
    assert_eq!(handle.pool().execute("DELETE FROM \"wide\"", &[]).await.unwrap(), 1000);
}

#[tokio::test]
async fn test_failed_upload_drops_new_table() {
    let dir = tempfile::tempdir().unwrap();
    let repo = MockDataSourceRepository::new();
    let node = node_with_driver(
        &repo,
        Arc::new(SqlxDataStoreDriver::new()),
        &InMemoryCoordinationStore::new(),
        StaticPermissionGate::allow_all(),
    );
    let actor = admin();
    let id = node.manager.create_source(&actor, sqlite_source(&dir)).await.unwrap().id;

    // 主键重复，插入失败
    let mut data = wide_rows(3, 2);
    data[2][0] = data[0][0].clone();
    let err = node
        .manager
        .upload_rows(&actor, id, wide_request("dupes", UploadMode::New, 2), data)
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::Database(_)));

    node.manager
        .validate_upload(&actor, id, "dupes", UploadMode::New)
        .await
        .unwrap();
}
