use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hub::{
    app::{Application, TrustedCallerGate},
    executors::default_executors,
    shutdown::{ShutdownManager, SHUTDOWN_GRACE_PERIOD},
};
use hub_core::{config::AppConfig, init_logging};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// 数据源连接注册中心与分布式定时任务调度服务
#[derive(Debug, Parser)]
#[command(name = "hub", version, about)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, value_name = "FILE", default_value = hub_core::config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_name = "FORMAT", value_parser = ["json", "pretty"])]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(Some(&cli.config))
        .with_context(|| format!("加载配置文件失败: {}", cli.config))?;

    let log_level = cli.log_level.as_deref().unwrap_or(&config.observability.log_level);
    let log_format = cli.log_format.as_deref().unwrap_or(&config.observability.log_format);
    init_logging(log_level, log_format)?;

    info!("启动数据源注册中心与定时任务调度服务");
    info!("配置文件: {}", cli.config);

    // 指标导出需要在创建任何指标句柄之前安装
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_bind
            .parse()
            .with_context(|| format!("无效的指标监听地址: {}", config.observability.metrics_bind))?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("安装Prometheus指标导出失败")?;
        info!("Prometheus指标导出: http://{}/metrics", addr);
    }

    let shutdown_manager = ShutdownManager::new();
    let app = Application::new(
        config,
        default_executors(),
        Arc::new(TrustedCallerGate),
        shutdown_manager.subscribe(),
    )
    .await?;

    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe();
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {e:#}");
            }
        })
    };

    shutdown_manager.shutdown_on_signal().await;
    info!("收到关闭信号，开始优雅关闭...");

    if shutdown_manager.drain(app_handle, SHUTDOWN_GRACE_PERIOD).await {
        info!("应用已优雅关闭");
    }

    info!("服务已退出");
    Ok(())
}
