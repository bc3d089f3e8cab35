use chrono::{Duration, Utc};
use hub_core::{
    config::DatabaseConfig,
    models::{CronJob, DataSourceConfig, JobStatus, JobType, SourceType},
    traits::{CronJobRepository, DataSourceRepository},
    HubError,
};
use hub_infrastructure::{DatabaseManager, SqliteCronJobRepository, SqliteSourceRepository};
use std::collections::BTreeMap;

async fn file_database(dir: &tempfile::TempDir) -> DatabaseManager {
    let config = DatabaseConfig {
        url: format!("sqlite:{}", dir.path().join("hub.db").display()),
        ..Default::default()
    };
    DatabaseManager::new(&config).await.unwrap()
}

fn source(name: &str) -> DataSourceConfig {
    let now = Utc::now();
    let mut properties = BTreeMap::new();
    properties.insert("useSSL".to_string(), "false".to_string());
    DataSourceConfig {
        id: 0,
        project_id: 1,
        name: name.to_string(),
        description: Some("desc".to_string()),
        source_type: SourceType::Jdbc,
        url: "jdbc:postgresql://h/db".to_string(),
        username: "u".to_string(),
        password: "ciphertext".to_string(),
        version: None,
        ext: false,
        properties,
        created_by: 7,
        created_at: now,
        updated_by: None,
        updated_at: now,
    }
}

fn job(name: &str) -> CronJob {
    let now = Utc::now();
    CronJob {
        id: 0,
        project_id: 1,
        name: name.to_string(),
        description: None,
        cron_expression: "0 * * * * *".to_string(),
        start_date: now - Duration::days(1),
        end_date: now + Duration::days(1),
        job_type: JobType::Email,
        job_status: JobStatus::New,
        failure_reason: None,
        config: serde_json::json!({"to": ["a@example.com"]}),
        created_by: 7,
        created_at: now,
        updated_by: None,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_source_repository_crud() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_database(&dir).await;
    let repo = SqliteSourceRepository::new(db.pool().clone());

    let created = repo.create(&source("pg1")).await.unwrap();
    assert!(created.id > 0);

    let loaded = repo.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, "pg1");
    assert_eq!(loaded.password, "ciphertext");
    assert_eq!(loaded.properties.get("useSSL").map(String::as_str), Some("false"));

    assert!(repo.find_by_name(1, "pg1").await.unwrap().is_some());
    assert!(repo.find_by_name(2, "pg1").await.unwrap().is_none());

    let mut changed = loaded.clone();
    changed.password = "other".to_string();
    changed.updated_by = Some(8);
    repo.update(&changed).await.unwrap();
    let reloaded = repo.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(reloaded.password, "other");
    assert_eq!(reloaded.updated_by, Some(8));

    assert_eq!(repo.list_by_project(1).await.unwrap().len(), 1);

    repo.delete(created.id).await.unwrap();
    assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    assert!(matches!(repo.delete(created.id).await, Err(HubError::NotFound { .. })));
}

#[tokio::test]
async fn test_duplicate_name_is_name_conflict() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let repo = SqliteSourceRepository::new(db.pool().clone());

    repo.create(&source("pg1")).await.unwrap();
    let err = repo.create(&source("pg1")).await.unwrap_err();
    assert!(matches!(err, HubError::NameConflict { .. }));
}

#[tokio::test]
async fn test_cron_job_repository_status_updates() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let repo = SqliteCronJobRepository::new(db.pool().clone());

    let created = repo.create(&job("daily")).await.unwrap();
    let loaded = repo.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(loaded.job_type, JobType::Email);
    assert_eq!(loaded.job_status, JobStatus::New);
    assert_eq!(loaded.config["to"][0], "a@example.com");

    repo.update_status(created.id, JobStatus::Failed, Some("trigger never fires"), 9)
        .await
        .unwrap();
    let failed = repo.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(failed.job_status, JobStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("trigger never fires"));

    repo.update_status(created.id, JobStatus::Start, None, 9).await.unwrap();
    let started = repo.list_by_status(JobStatus::Start).await.unwrap();
    assert_eq!(started.len(), 1);
    assert!(started[0].failure_reason.is_none());

    let mut edited = started[0].clone();
    edited.cron_expression = "0 0 * * * *".to_string();
    edited.job_type = JobType::parse("weChatWork");
    repo.update(&edited).await.unwrap();
    let reloaded = repo.find_by_name(1, "daily").await.unwrap().unwrap();
    assert_eq!(reloaded.cron_expression, "0 0 * * * *");
    assert_eq!(reloaded.job_type, JobType::ChatNotify);

    assert!(matches!(
        repo.update_status(999, JobStatus::Stop, None, 1).await,
        Err(HubError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_window_roundtrips_through_storage() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let repo = SqliteCronJobRepository::new(db.pool().clone());
    let original = job("window");

    let created = repo.create(&original).await.unwrap();
    let loaded = repo.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(loaded.start_date.timestamp(), original.start_date.timestamp());
    assert_eq!(loaded.end_date.timestamp(), original.end_date.timestamp());
    assert!(loaded.is_within_window(Utc::now()));
}
