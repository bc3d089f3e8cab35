//! # hub-application
//!
//! 数据源与定时任务的请求/响应用例。每个操作都带调用者身份，
//! 依次完成存在性检查、权限判定、名称加锁、持久化与集群同步。

pub mod interfaces;
pub mod services;

pub use interfaces::*;
pub use services::*;
