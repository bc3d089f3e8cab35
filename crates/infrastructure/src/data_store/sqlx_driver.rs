use async_trait::async_trait;
use hub_core::{
    models::{ConnectionSpec, Dialect, QueryColumn, TableInfo},
    traits::{DataStoreDriver, DataStorePool, DataStorePoolOptions},
    HubError, HubResult,
};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

/// 基于 sqlx `Any` 驱动的外部数据源驱动
///
/// 支持 MySQL、PostgreSQL 与 SQLite，URL 可以带 `jdbc:` 前缀。
#[derive(Debug, Clone, Copy)]
pub struct SqlxDataStoreDriver;

impl Default for SqlxDataStoreDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlxDataStoreDriver {
    pub fn new() -> Self {
        sqlx::any::install_default_drivers();
        Self
    }

    /// 组装驱动连接串：去掉 `jdbc:` 前缀，注入用户名密码并追加连接属性
    pub fn connect_url(spec: &ConnectionSpec) -> HubResult<String> {
        let raw = spec.driver_url();
        if spec.dialect()? == Dialect::Sqlite {
            return Ok(raw.to_string());
        }

        let mut url = Url::parse(raw)
            .map_err(|e| HubError::validation(format!("无效的数据源地址 {raw}: {e}")))?;

        if !spec.username.is_empty() {
            url.set_username(&spec.username)
                .map_err(|_| HubError::validation(format!("数据源地址不支持用户名: {raw}")))?;
            if !spec.password().is_empty() {
                url.set_password(Some(spec.password()))
                    .map_err(|_| HubError::validation(format!("数据源地址不支持密码: {raw}")))?;
            }
        }

        if !spec.properties.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &spec.properties {
                pairs.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }
}

#[async_trait]
impl DataStoreDriver for SqlxDataStoreDriver {
    #[instrument(skip(self, spec, options), fields(label = %spec.label))]
    async fn open(
        &self,
        spec: &ConnectionSpec,
        options: &DataStorePoolOptions,
    ) -> HubResult<Arc<dyn DataStorePool>> {
        let dialect = spec.dialect()?;
        let url = Self::connect_url(spec)?;

        let pool = AnyPoolOptions::new()
            .max_connections(options.max_connections)
            .min_connections(options.min_connections)
            .acquire_timeout(options.connect_timeout)
            .idle_timeout(options.idle_timeout)
            .max_lifetime(options.max_lifetime)
            .connect(&url)
            .await
            .map_err(|e| HubError::connectivity(format!("{}: {}", spec.label, e)))?;

        debug!("外部数据源连接池已建立: {}", spec.label);
        Ok(Arc::new(SqlxDataStorePool { pool, dialect }))
    }
}

/// sqlx `AnyPool` 包装
pub struct SqlxDataStorePool {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlxDataStorePool {
    fn string_column(rows: &[AnyRow], index: usize) -> HubResult<Vec<String>> {
        rows.iter()
            .map(|row| row.try_get::<String, _>(index).map_err(HubError::from))
            .collect()
    }

    async fn primary_keys(&self, database: &str, table: &str) -> HubResult<Vec<String>> {
        let rows = match self.dialect {
            Dialect::MySql => {
                sqlx::query(
                    "SELECT CAST(COLUMN_NAME AS CHAR) FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND COLUMN_KEY = 'PRI' ORDER BY ORDINAL_POSITION",
                )
                .bind(database)
                .bind(table)
                .fetch_all(&self.pool)
                .await?
            }
            Dialect::Postgres => {
                sqlx::query(
                    r#"
                    SELECT kcu.column_name::text
                    FROM information_schema.table_constraints tc
                    JOIN information_schema.key_column_usage kcu
                      ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
                    WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_catalog = $1 AND tc.table_name = $2
                    ORDER BY kcu.ordinal_position
                    "#,
                )
                .bind(database)
                .bind(table)
                .fetch_all(&self.pool)
                .await?
            }
            Dialect::Sqlite => {
                sqlx::query("SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk")
                    .bind(table)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Self::string_column(&rows, 0)
    }
}

#[async_trait]
impl DataStorePool for SqlxDataStorePool {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn ping(&self) -> HubResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| HubError::connectivity(e.to_string()))?;
        Ok(())
    }

    async fn databases(&self) -> HubResult<Vec<String>> {
        let sql = match self.dialect {
            Dialect::MySql => "SELECT CAST(SCHEMA_NAME AS CHAR) FROM information_schema.SCHEMATA ORDER BY SCHEMA_NAME",
            Dialect::Postgres => {
                "SELECT datname::text FROM pg_database WHERE datistemplate = false ORDER BY datname"
            }
            Dialect::Sqlite => "SELECT name FROM pragma_database_list ORDER BY seq",
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        Self::string_column(&rows, 0)
    }

    async fn tables(&self, database: &str) -> HubResult<Vec<QueryColumn>> {
        let rows = match self.dialect {
            Dialect::MySql => {
                sqlx::query(
                    "SELECT CAST(TABLE_NAME AS CHAR), CAST(TABLE_TYPE AS CHAR) FROM information_schema.TABLES WHERE TABLE_SCHEMA = ? ORDER BY TABLE_NAME",
                )
                .bind(database)
                .fetch_all(&self.pool)
                .await?
            }
            Dialect::Postgres => {
                sqlx::query(
                    "SELECT table_name::text, table_type::text FROM information_schema.tables WHERE table_catalog = $1 AND table_schema NOT IN ('pg_catalog', 'information_schema') ORDER BY table_name",
                )
                .bind(database)
                .fetch_all(&self.pool)
                .await?
            }
            Dialect::Sqlite => {
                sqlx::query(
                    "SELECT name, upper(type) FROM sqlite_master WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter()
            .map(|row| {
                let name: String = row.try_get(0)?;
                let kind: String = row.try_get(1)?;
                let kind = if kind.to_ascii_uppercase().contains("VIEW") { "VIEW" } else { "TABLE" };
                Ok(QueryColumn::new(name, kind))
            })
            .collect()
    }

    async fn columns(&self, database: &str, table: &str) -> HubResult<TableInfo> {
        let rows = match self.dialect {
            Dialect::MySql => {
                sqlx::query(
                    "SELECT CAST(COLUMN_NAME AS CHAR), CAST(DATA_TYPE AS CHAR) FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
                )
                .bind(database)
                .bind(table)
                .fetch_all(&self.pool)
                .await?
            }
            Dialect::Postgres => {
                sqlx::query(
                    "SELECT column_name::text, data_type::text FROM information_schema.columns WHERE table_catalog = $1 AND table_name = $2 ORDER BY ordinal_position",
                )
                .bind(database)
                .bind(table)
                .fetch_all(&self.pool)
                .await?
            }
            Dialect::Sqlite => {
                sqlx::query("SELECT name, type FROM pragma_table_info(?) ORDER BY cid")
                    .bind(table)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let columns = rows
            .iter()
            .map(|row| {
                let name: String = row.try_get(0)?;
                let column_type: String = row.try_get(1)?;
                Ok(QueryColumn::new(name, column_type))
            })
            .collect::<HubResult<Vec<_>>>()?;

        Ok(TableInfo {
            table_name: table.to_string(),
            primary_keys: self.primary_keys(database, table).await?,
            columns,
        })
    }

    async fn table_exists(&self, table: &str) -> HubResult<bool> {
        let sql = match self.dialect {
            Dialect::MySql => {
                "SELECT COUNT(*) FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?"
            }
            Dialect::Postgres => {
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = $1"
            }
            Dialect::Sqlite => "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        };
        let count: i64 = sqlx::query(sql)
            .bind(table)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        Ok(count > 0)
    }

    async fn execute(&self, sql: &str, params: &[Option<String>]) -> HubResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.clone());
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::models::ConnectionParams;
    use std::collections::BTreeMap;

    fn spec(url: &str, user: &str, password: &str) -> ConnectionSpec {
        let mut properties = BTreeMap::new();
        properties.insert("sslmode".to_string(), "disable".to_string());
        ConnectionSpec::new(
            "1@pg1",
            &ConnectionParams {
                url: url.to_string(),
                username: user.to_string(),
                password: password.to_string(),
                version: None,
                ext: false,
                properties,
            },
        )
    }

    #[test]
    fn test_connect_url_injects_credentials() {
        let url = SqlxDataStoreDriver::connect_url(&spec("jdbc:postgresql://h:5432/db", "u", "p@ss")).unwrap();
        assert_eq!(url, "postgresql://u:p%40ss@h:5432/db?sslmode=disable");
    }

    #[test]
    fn test_connect_url_keeps_sqlite_path() {
        let url = SqlxDataStoreDriver::connect_url(&spec("sqlite:/tmp/x.db", "", "")).unwrap();
        assert_eq!(url, "sqlite:/tmp/x.db");
    }

    #[tokio::test]
    async fn test_sqlite_metadata_and_execute() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ext.db");
        let url = format!("sqlite:{}?mode=rwc", path.display());

        let driver = SqlxDataStoreDriver::new();
        let pool = driver
            .open(&spec(&url, "", ""), &DataStorePoolOptions::default())
            .await
            .unwrap();

        pool.ping().await.unwrap();
        assert_eq!(pool.dialect(), Dialect::Sqlite);
        assert!(!pool.table_exists("people").await.unwrap());

        pool.execute("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();
        let inserted = pool
            .execute(
                "INSERT INTO people (id, name) VALUES (?, ?), (?, ?)",
                &[Some("1".into()), Some("a".into()), Some("2".into()), None],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        assert!(pool.table_exists("people").await.unwrap());
        let tables = pool.tables("main").await.unwrap();
        assert_eq!(tables, vec![QueryColumn::new("people", "TABLE")]);

        let info = pool.columns("main", "people").await.unwrap();
        assert_eq!(info.primary_keys, vec!["id".to_string()]);
        assert_eq!(info.columns.len(), 2);
        assert_eq!(pool.databases().await.unwrap(), vec!["main".to_string()]);

        pool.close().await;
    }

    #[tokio::test]
    async fn test_unreachable_store_is_connectivity_failure() {
        let driver = SqlxDataStoreDriver::new();
        let options = DataStorePoolOptions {
            connect_timeout: std::time::Duration::from_millis(500),
            ..Default::default()
        };
        let err = match driver.open(&spec("postgres://127.0.0.1:1/db", "u", "p"), &options).await {
            Ok(_) => panic!("connection should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, HubError::ConnectivityFailure(_)));
    }
}
