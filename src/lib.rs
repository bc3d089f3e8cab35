//! # hub
//!
//! 独立运行的服务进程：装配注册中心、调度与集群通道，处理启动恢复与优雅关闭。

pub mod app;
pub mod executors;
pub mod shutdown;
