use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use scrape_core::config::DatabaseConfig;
use scrape_core::traits::{EntityRepository, RunRepository, SourceScheduleRepository};
use scrape_core::SchedulerResult;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::migrations::run_migrations;
use super::sqlite::{SqliteEntityRepository, SqliteRunRepository, SqliteSourceScheduleRepository};

/// SQLite 连接池与仓储工厂
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// 建立连接池并执行迁移
    pub async fn new(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let mut connect_options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds));

        if config.is_in_memory() {
            // 每个内存连接都是独立的数据库，连接池只保留一个永不回收的连接
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
            pool_options = pool_options
                .max_connections(config.max_connections)
                .min_connections(config.min_connections);
        }

        let pool = pool_options.connect_with(connect_options).await?;
        run_migrations(&pool).await?;

        info!(url = %config.url, "数据库连接池创建完成");
        Ok(Self { pool })
    }

    /// 测试与单进程部署用的内存数据库
    pub async fn in_memory() -> SchedulerResult<Self> {
        Self::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        })
        .await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn schedule_repository(&self) -> Arc<dyn SourceScheduleRepository> {
        Arc::new(SqliteSourceScheduleRepository::new(self.pool.clone()))
    }

    pub fn run_repository(&self) -> Arc<dyn RunRepository> {
        Arc::new(SqliteRunRepository::new(self.pool.clone()))
    }

    pub fn entity_repository(&self) -> Arc<dyn EntityRepository> {
        Arc::new(SqliteEntityRepository::new(self.pool.clone()))
    }
}
