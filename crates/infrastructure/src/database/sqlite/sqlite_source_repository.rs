use async_trait::async_trait;
use chrono::Utc;
use hub_core::{
    models::{DataSourceConfig, EntityKind, SourceType},
    traits::DataSourceRepository,
    HubError, HubResult,
};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use super::map_write_error;

const SELECT_COLUMNS: &str = "SELECT id, project_id, name, description, source_type, url, username, password, version, ext, properties, created_by, created_at, updated_by, updated_at FROM data_sources";

pub struct SqliteSourceRepository {
    pool: SqlitePool,
}

impl SqliteSourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_source(row: &sqlx::sqlite::SqliteRow) -> HubResult<DataSourceConfig> {
        let source_type: String = row.try_get("source_type")?;
        let properties: String = row.try_get("properties")?;
        let properties: BTreeMap<String, String> = serde_json::from_str(&properties)?;

        Ok(DataSourceConfig {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            source_type: SourceType::parse(&source_type)?,
            url: row.try_get("url")?,
            username: row.try_get("username")?,
            password: row.try_get("password")?,
            version: row.try_get("version")?,
            ext: row.try_get("ext")?,
            properties,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_by: row.try_get("updated_by")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl DataSourceRepository for SqliteSourceRepository {
    #[instrument(skip(self, source), fields(source_name = %source.name, project_id = source.project_id))]
    async fn create(&self, source: &DataSourceConfig) -> HubResult<DataSourceConfig> {
        let properties = serde_json::to_string(&source.properties)?;

        let result = sqlx::query(
            r#"
            INSERT INTO data_sources (project_id, name, description, source_type, url, username, password, version, ext, properties, created_by, created_at, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(source.project_id)
        .bind(&source.name)
        .bind(&source.description)
        .bind(source.source_type.as_str())
        .bind(&source.url)
        .bind(&source.username)
        .bind(&source.password)
        .bind(&source.version)
        .bind(source.ext)
        .bind(properties)
        .bind(source.created_by)
        .bind(source.created_at)
        .bind(source.updated_by)
        .bind(source.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, EntityKind::Source, &source.name))?;

        let mut created = source.clone();
        created.id = result.last_insert_rowid();
        debug!("创建数据源成功: ID {}, 名称: {}", created.id, created.name);
        Ok(created)
    }

    #[instrument(skip(self), fields(source_id = %id))]
    async fn get_by_id(&self, id: i64) -> HubResult<Option<DataSourceConfig>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_source).transpose()
    }

    async fn find_by_name(&self, project_id: i64, name: &str) -> HubResult<Option<DataSourceConfig>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE project_id = $1 AND name = $2"))
            .bind(project_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_source).transpose()
    }

    async fn list_by_project(&self, project_id: i64) -> HubResult<Vec<DataSourceConfig>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE project_id = $1 ORDER BY id"))
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_source).collect()
    }

    #[instrument(skip(self, source), fields(source_id = %source.id, source_name = %source.name))]
    async fn update(&self, source: &DataSourceConfig) -> HubResult<()> {
        let properties = serde_json::to_string(&source.properties)?;

        let result = sqlx::query(
            r#"
            UPDATE data_sources
            SET name = $2, description = $3, url = $4, username = $5, password = $6,
                version = $7, ext = $8, properties = $9, updated_by = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(source.id)
        .bind(&source.name)
        .bind(&source.description)
        .bind(&source.url)
        .bind(&source.username)
        .bind(&source.password)
        .bind(&source.version)
        .bind(source.ext)
        .bind(properties)
        .bind(source.updated_by)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, EntityKind::Source, &source.name))?;

        if result.rows_affected() == 0 {
            return Err(HubError::not_found("数据源", source.id));
        }

        debug!("更新数据源成功: ID {}", source.id);
        Ok(())
    }

    async fn delete(&self, id: i64) -> HubResult<()> {
        let result = sqlx::query("DELETE FROM data_sources WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::not_found("数据源", id));
        }

        debug!("删除数据源成功: ID {}", id);
        Ok(())
    }
}
