use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::ConnectionParams;
use crate::security::{fingerprint, Fingerprint};
use crate::{HubError, HubResult};

/// 连接参数
///
/// 由数据源配置或测试请求派生，生命周期只覆盖一次连接操作，
/// 密码以明文保存在内存中，`Debug` 输出时脱敏。
#[derive(Clone)]
pub struct ConnectionSpec {
    pub label: String,
    pub url: String,
    pub username: String,
    password: String,
    pub version: Option<String>,
    pub ext: bool,
    pub properties: BTreeMap<String, String>,
}

impl ConnectionSpec {
    /// 表示"使用内置驱动版本"的版本号
    pub const DEFAULT_VERSION: &'static str = "Default";

    /// 构造并规范化连接参数
    ///
    /// - 非扩展驱动时忽略驱动版本
    /// - 版本为空或为 `Default` 时清空版本并关闭扩展标记
    ///
    /// 因此 `{ext: true, version: "Default"}` 与 `{ext: false}` 是同一个连接，
    /// 指纹相同、共用连接池。
    pub fn new(label: impl Into<String>, params: &ConnectionParams) -> Self {
        let mut ext = params.ext;
        let mut version = if ext { params.version.clone() } else { None };

        let is_default = version
            .as_deref()
            .map(|v| v.trim().is_empty() || v == Self::DEFAULT_VERSION)
            .unwrap_or(true);
        if is_default {
            version = None;
            ext = false;
        }

        Self {
            label: label.into(),
            url: params.url.trim().to_string(),
            username: params.username.clone(),
            password: params.password.clone(),
            version,
            ext,
            properties: params.properties.clone(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// 连接身份指纹，连接池以此为键
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(
            &self.label,
            &self.url,
            &self.username,
            &self.password,
            self.version.as_deref(),
            self.ext,
        )
    }

    /// 去掉 `jdbc:` 前缀后的驱动URL
    pub fn driver_url(&self) -> &str {
        self.url.strip_prefix("jdbc:").unwrap_or(&self.url)
    }

    pub fn dialect(&self) -> HubResult<Dialect> {
        Dialect::from_url(&self.url)
    }
}

impl fmt::Debug for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSpec")
            .field("label", &self.label)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"******")
            .field("version", &self.version)
            .field("ext", &self.ext)
            .finish()
    }
}

/// 外部数据存储的SQL方言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    MySql,
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn from_url(url: &str) -> HubResult<Self> {
        let url = url.trim();
        let url = url.strip_prefix("jdbc:").unwrap_or(url);
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            _ => Err(HubError::validation(format!("不支持的数据源地址: {url}"))),
        }
    }

    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// 单条语句允许的绑定参数上限
    pub fn max_bind_params(&self) -> usize {
        match self {
            Dialect::Sqlite => 32_766,
            Dialect::MySql | Dialect::Postgres => 65_535,
        }
    }

    /// 多行插入时每批的行数，不超过 `preferred` 且参数个数不超过上限
    pub fn insert_batch_rows(&self, columns: usize, preferred: usize) -> usize {
        if columns == 0 {
            return preferred.max(1);
        }
        preferred.min(self.max_bind_params() / columns).max(1)
    }

    /// 第 `index` 个（从1开始）绑定参数的占位符
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    pub fn truncate_sql(&self, table: &str) -> String {
        match self {
            Dialect::Sqlite => format!("DELETE FROM {}", self.quote_ident(table)),
            _ => format!("TRUNCATE TABLE {}", self.quote_ident(table)),
        }
    }

    pub fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_ident(table))
    }

    pub fn create_table_sql(&self, table: &str, columns: &[QueryColumn], primary_keys: &[String]) -> String {
        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", self.quote_ident(&c.name), c.column_type))
            .collect();
        if !primary_keys.is_empty() {
            let keys: Vec<String> = primary_keys.iter().map(|k| self.quote_ident(k)).collect();
            defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }
        format!("CREATE TABLE {} ({})", self.quote_ident(table), defs.join(", "))
    }

    /// 生成多行插入语句，`rows` 为本批次行数
    ///
    /// 参数均以文本绑定，PostgreSQL 不做隐式转换，因此按列类型显式 `CAST`。
    pub fn insert_sql(&self, table: &str, columns: &[QueryColumn], rows: usize) -> String {
        let names: Vec<String> = columns.iter().map(|c| self.quote_ident(&c.name)).collect();
        let mut index = 0;
        let groups: Vec<String> = (0..rows)
            .map(|_| {
                let marks: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        index += 1;
                        let mark = self.placeholder(index);
                        match self {
                            Dialect::Postgres if !c.column_type.trim().is_empty() => {
                                format!("CAST({} AS {})", mark, c.column_type)
                            }
                            _ => mark,
                        }
                    })
                    .collect();
                format!("({})", marks.join(", "))
            })
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.quote_ident(table),
            names.join(", "),
            groups.join(", ")
        )
    }
}

/// 列信息，也用于表列表（此时 `column_type` 为 TABLE / VIEW）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryColumn {
    pub name: String,
    pub column_type: String,
}

impl QueryColumn {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }
}

/// 某个库下的表列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbTables {
    pub db_name: String,
    pub tables: Vec<QueryColumn>,
}

/// 表结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub table_name: String,
    pub primary_keys: Vec<String>,
    pub columns: Vec<QueryColumn>,
}

/// 数据写入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// 新建表，表已存在时报错
    New,
    /// 清空已有表后写入
    Replace,
    /// 追加到已有表
    Append,
    /// 删除重建后写入
    Cover,
}

/// 写入请求，行数据由外部文件解析器产生
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub table_name: String,
    pub mode: UploadMode,
    pub columns: Vec<QueryColumn>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
}

impl UploadRequest {
    pub fn validate(&self) -> HubResult<()> {
        if self.table_name.trim().is_empty() {
            return Err(HubError::validation("表名不能为空"));
        }
        if self.columns.is_empty() {
            return Err(HubError::validation("没有任何字段"));
        }
        for key in &self.primary_keys {
            if !self.columns.iter().any(|c| &c.name == key) {
                return Err(HubError::validation(format!("主键字段不存在: {key}")));
            }
        }
        Ok(())
    }
}

/// 一行待写入的数据，`None` 表示 NULL
pub type UploadRow = Vec<Option<String>>;
