//! # hub-core
//!
//! 数据源注册中心与分布式定时任务调度的核心库：错误类型、配置、
//! 领域模型、协作方接口、凭据编解码与连接指纹。

pub mod clock;
pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod security;
pub mod traits;

pub use clock::{Clock, SystemClock};
pub use config::*;
pub use errors::{HubError, HubResult};
pub use logging::init_logging;
pub use traits::*;
