pub mod sqlite_cron_job_repository;
pub mod sqlite_source_repository;

pub use sqlite_cron_job_repository::SqliteCronJobRepository;
pub use sqlite_source_repository::SqliteSourceRepository;

use hub_core::{config::DatabaseConfig, models::EntityKind, HubError, HubResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub type DbPool = Pool<Sqlite>;

/// 元数据库管理器
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> HubResult<Self> {
        let connect_options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(1800))
            .connect_with(connect_options)
            .await?;

        let manager = Self { pool };
        manager.migrate().await?;
        Ok(manager)
    }

    /// 内存数据库，只保留一个连接以共享同一个库
    pub async fn in_memory() -> HubResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let manager = Self { pool };
        manager.migrate().await?;
        Ok(manager)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 运行数据库迁移
    pub async fn migrate(&self) -> HubResult<()> {
        debug!("Running SQLite database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS data_sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                source_type TEXT NOT NULL,
                url TEXT NOT NULL,
                username TEXT NOT NULL DEFAULT '',
                password TEXT NOT NULL DEFAULT '',
                version TEXT,
                ext BOOLEAN NOT NULL DEFAULT 0,
                properties TEXT NOT NULL DEFAULT '{}',
                created_by INTEGER NOT NULL,
                created_at DATETIME NOT NULL,
                updated_by INTEGER,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cron_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                cron_expression TEXT NOT NULL,
                start_date DATETIME NOT NULL,
                end_date DATETIME NOT NULL,
                job_type TEXT NOT NULL,
                job_status TEXT NOT NULL DEFAULT 'new',
                failure_reason TEXT,
                config TEXT NOT NULL DEFAULT 'null',
                created_by INTEGER NOT NULL,
                created_at DATETIME NOT NULL,
                updated_by INTEGER,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let indexes = vec![
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_data_sources_project_name ON data_sources(project_id, name)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_cron_jobs_project_name ON cron_jobs(project_id, name)",
            "CREATE INDEX IF NOT EXISTS idx_cron_jobs_status ON cron_jobs(job_status)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql).execute(&self.pool).await?;
        }

        debug!("Successfully completed SQLite database migrations");
        Ok(())
    }

    pub async fn health_check(&self) -> HubResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// 唯一索引冲突映射为名称冲突，其余保持数据库错误
pub(crate) fn map_write_error(err: sqlx::Error, kind: EntityKind, name: &str) -> HubError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => HubError::name_conflict(kind, name),
        _ => HubError::Database(err),
    }
}
