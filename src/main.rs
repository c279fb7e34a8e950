use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use scrape_core::config::{AppConfig, LogFormat};
use scrape_infrastructure::{init_metrics, init_structured_logging, LoggingConfig};
use tracing::{error, info, warn};

use scrape_scheduler::{wait_for_shutdown_signal, AppMode, Application, ShutdownManager};

/// 定时抓取调度系统
#[derive(clap::Parser, Debug)]
#[command(name = "scrape-scheduler", version, about = "定时抓取队列：调度、互斥、执行与幂等持久化")]
struct Cli {
    /// 配置文件路径，未指定时按默认路径搜索
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 运行模式
    #[arg(short, long, value_enum, default_value_t = AppMode::All)]
    mode: AppMode,

    /// 覆盖配置中的 Worker ID
    #[arg(long, value_name = "ID")]
    worker_id: Option<String>,

    /// 覆盖配置中的日志级别
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// 覆盖配置中的日志格式 (json, pretty, compact)
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).with_context(|| {
        format!(
            "加载配置失败: {}",
            cli.config.as_deref().unwrap_or("<默认路径>")
        )
    })?;

    if let Some(worker_id) = cli.worker_id {
        config.worker.worker_id = worker_id;
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.observability.log_format = format;
    }
    config.validate()?;

    init_structured_logging(LoggingConfig {
        level: config.observability.log_level.clone(),
        format: config.observability.log_format,
        include_location: false,
    })?;

    if config.observability.metrics_enabled {
        init_metrics(&config.observability.metrics_bind_address)?;
        info!("指标导出已启用: {}", config.observability.metrics_bind_address);
    }

    info!("启动定时抓取调度系统，模式: {:?}", cli.mode);

    let app = Arc::new(Application::new(config, cli.mode).await?);
    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown_manager.subscribe().await;
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {:#}", e);
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {}", e),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    Ok(())
}
