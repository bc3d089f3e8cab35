//! # hub-registry
//!
//! 外部数据源连接池注册中心：按连接指纹缓存连接池，同一指纹的并发获取只建立一次连接池。

pub mod handler;
pub mod pool_registry;

pub use handler::SourceReleaseHandler;
pub use pool_registry::{ConnectionHandle, ConnectionPoolRegistry, PooledConnection};
