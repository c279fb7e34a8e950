use std::sync::Arc;

use anyhow::{Context, Result};
use scrape_api::create_app;
use scrape_core::config::{AppConfig, LockBackendType, MessageQueueType};
use scrape_core::traits::{LockCoordinator, MessageQueue, RunControlService};
use scrape_dispatcher::{RunController, SourceScheduler};
use scrape_infrastructure::{
    DatabaseManager, LockCoordinatorFactory, MessageQueueFactory, MetricsCollector,
};
use scrape_worker::{
    ExecutorSettings, ExtractorRegistry, HttpJsonExtractor, RunExecutor, WorkerService,
};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info, warn};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AppMode {
    /// 仅运行调度器
    Scheduler,
    /// 仅运行Worker
    Worker,
    /// 仅运行API服务器
    Api,
    /// 运行所有组件
    All,
}

/// 主应用程序
///
/// 持有所有组件共享的存储、队列与锁协调器。内存队列和内存锁只在同一进程内共享，
/// 多进程部署需要 Redis 后端。
#[derive(Clone)]
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    database: Arc<DatabaseManager>,
    message_queue: Arc<dyn MessageQueue>,
    lock_coordinator: Arc<dyn LockCoordinator>,
    extractors: Arc<ExtractorRegistry>,
    metrics: MetricsCollector,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;

        let message_queue = MessageQueueFactory::create(&config.message_queue, &config.worker.worker_id)
            .await
            .context("创建消息队列失败")?;

        let lock_coordinator = LockCoordinatorFactory::create(&config.lock)
            .await
            .context("创建锁协调器失败")?;

        if mode != AppMode::All
            && (config.message_queue.backend == MessageQueueType::Memory
                || config.lock.backend == LockBackendType::Memory)
        {
            warn!("内存队列或内存锁只在单进程内生效，分模式部署请使用 Redis 后端");
        }

        Ok(Self {
            config,
            mode,
            database: Arc::new(database),
            message_queue,
            lock_coordinator,
            extractors: Arc::new(
                ExtractorRegistry::new().with_fallback(Arc::new(HttpJsonExtractor::new())),
            ),
            metrics: MetricsCollector::new(),
        })
    }

    /// 替换抽取函数注册表
    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = Arc::new(extractors);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.database
    }

    pub fn message_queue(&self) -> Arc<dyn MessageQueue> {
        Arc::clone(&self.message_queue)
    }

    /// 运行控制服务，API 与启动时的配置写入共用
    pub fn controller(&self) -> RunController {
        RunController::new(
            self.database.schedule_repository(),
            self.database.run_repository(),
            Arc::clone(&self.message_queue),
            self.config.message_queue.run_queue.clone(),
            self.metrics.clone(),
        )
        .with_defaults(
            self.config.worker.default_pacing,
            self.config.worker.default_max_retries,
        )
    }

    pub fn scheduler(&self) -> SourceScheduler {
        SourceScheduler::new(
            self.database.schedule_repository(),
            self.database.run_repository(),
            Arc::clone(&self.message_queue),
            Arc::clone(&self.lock_coordinator),
            self.config.message_queue.run_queue.clone(),
            self.config.dispatcher.clone(),
            self.metrics.clone(),
        )
        .with_stale_run_after(
            self.config
                .dispatcher
                .stale_run_after(self.config.lock.ttl()),
        )
    }

    pub fn worker(&self) -> WorkerService {
        let executor = RunExecutor::new(
            self.config.worker.worker_id.clone(),
            self.database.run_repository(),
            self.database.entity_repository(),
            Arc::clone(&self.lock_coordinator),
            Arc::clone(&self.extractors),
            ExecutorSettings::from_config(&self.config.worker, &self.config.lock),
            self.metrics.clone(),
        );

        WorkerService::builder(
            self.config.worker.worker_id.clone(),
            Arc::clone(&self.message_queue),
            Arc::new(executor),
            self.config.message_queue.run_queue.clone(),
        )
        .concurrency(self.config.worker.concurrency)
        .poll_timeout(self.config.message_queue.poll_interval())
        .build()
    }

    /// 把配置文件中的抓取源写入调度表，已存在的源保留调度状态
    pub async fn seed_sources(&self) -> Result<usize> {
        let controller = self.controller();
        for source in &self.config.sources {
            controller
                .upsert_schedule(source.to_schedule())
                .await
                .with_context(|| format!("写入抓取源配置失败: {}", source.source_name))?;
        }
        if !self.config.sources.is_empty() {
            info!(count = self.config.sources.len(), "抓取源配置已同步");
        }
        Ok(self.config.sources.len())
    }

    /// 运行应用程序，直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        if self.mode != AppMode::Worker {
            self.seed_sources().await?;
        }

        match self.mode {
            AppMode::Scheduler => self.run_scheduler(shutdown_rx).await?,
            AppMode::Worker => self.run_worker(shutdown_rx).await?,
            AppMode::Api => self.run_api(shutdown_rx).await?,
            AppMode::All => self.run_all_components(shutdown_rx).await?,
        }

        self.database.close().await;
        Ok(())
    }

    async fn run_scheduler(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动调度器服务");
        self.scheduler().run(shutdown_rx).await;
        info!("调度器服务已停止");
        Ok(())
    }

    async fn run_worker(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动Worker服务: {}", self.config.worker.worker_id);
        self.worker()
            .run(shutdown_rx)
            .await
            .context("Worker运行失败")?;
        info!("Worker服务已停止");
        Ok(())
    }

    async fn run_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let control: Arc<dyn RunControlService> = Arc::new(self.controller());
        let app = create_app(control);

        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;

        info!("API服务器启动在 http://{}", self.config.api.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败")?;

        info!("API服务器已停止");
        Ok(())
    }

    async fn run_all_components(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动所有组件");

        let mut handles = Vec::new();

        if self.config.dispatcher.enabled {
            let app = self.clone();
            let shutdown_rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                if let Err(e) = app.run_scheduler(shutdown_rx).await {
                    error!("调度器运行失败: {:#}", e);
                }
            }));
        }

        if self.config.worker.enabled {
            let app = self.clone();
            let shutdown_rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                if let Err(e) = app.run_worker(shutdown_rx).await {
                    error!("Worker运行失败: {:#}", e);
                }
            }));
        }

        if self.config.api.enabled {
            let app = self.clone();
            let shutdown_rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                if let Err(e) = app.run_api(shutdown_rx).await {
                    error!("API服务器运行失败: {:#}", e);
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("组件任务异常退出: {}", e);
            }
        }

        info!("所有组件已停止");
        Ok(())
    }
}
