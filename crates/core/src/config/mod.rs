//! 配置管理
//!
//! 配置加载顺序：内置默认值 → TOML 配置文件 → `HUB_` 前缀环境变量。
//! 嵌套字段使用 `__` 分隔，例如 `HUB_COORDINATION__REDIS_URL`。

pub mod models;

pub use models::*;
