pub mod app_config;
pub mod coordination;
pub mod database;
pub mod observability;
pub mod pool;
pub mod scheduler;
pub mod security;

pub use app_config::{AppConfig, NodeConfig, DEFAULT_CONFIG_PATH};
pub use coordination::{CoordinationConfig, LockFallback};
pub use database::DatabaseConfig;
pub use observability::ObservabilityConfig;
pub use pool::PoolConfig;
pub use scheduler::SchedulerConfig;
pub use security::SecurityConfig;
