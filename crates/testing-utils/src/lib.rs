//! # Hub Testing Utils
//!
//! 工作区共享的测试工具：
//!
//! - **Mock仓储**: 数据源与定时任务仓储的内存实现
//! - **Mock外部数据源**: 可计数、可注入延迟与失败的数据源驱动
//! - **调度测试替身**: 触发器调度、触发回调、任务执行器、固定时钟
//! - **权限门**: 固定结果的权限判定
//! - **构造器**: 带合理默认值的测试数据构造
//!
//! ```toml
//! [dev-dependencies]
//! hub-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
