use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    database::DatabaseConfig,
    dispatcher_worker::{DispatcherConfig, WorkerConfig},
    lock::LockConfig,
    message_queue::MessageQueueConfig,
    sources::SourceSeedConfig,
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub message_queue: MessageQueueConfig,
    pub lock: LockConfig,
    pub dispatcher: DispatcherConfig,
    pub worker: WorkerConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
    pub sources: Vec<SourceSeedConfig>,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: SCRAPE_, nested with `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/scrape-scheduler.toml",
                "scrape-scheduler.toml",
                "/etc/scrape-scheduler/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SCRAPE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;

        self.message_queue
            .validate()
            .context("消息队列配置验证失败")?;

        self.lock.validate().context("锁配置验证失败")?;

        self.dispatcher
            .validate()
            .context("Dispatcher配置验证失败")?;

        self.worker.validate().context("Worker配置验证失败")?;

        self.api.validate().context("API配置验证失败")?;

        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            source
                .validate()
                .with_context(|| format!("抓取源配置验证失败: {}", source.source_name))?;
            if !seen.insert(source.source_name.as_str()) {
                return Err(anyhow::anyhow!("抓取源重复: {}", source.source_name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogFormat, MessageQueueType};
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatcher.jitter_ratio, 0.10);
        assert_eq!(config.worker.error_tolerance, 0.30);
        assert_eq!(config.lock.ttl_seconds, 60);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
[message_queue]
backend = "redis"
url = "redis://cache:6379"

[observability]
log_format = "json"

[[sources]]
source_name = "board"
interval_seconds = 3600
pacing = { min_delay_ms = 100, max_delay_ms = 200 }
"#,
        )
        .unwrap();

        assert_eq!(config.message_queue.backend, MessageQueueType::Redis);
        assert_eq!(config.message_queue.run_queue, "scrape_runs");
        assert_eq!(config.observability.log_format, LogFormat::Json);
        let schedule = config.sources[0].to_schedule();
        assert_eq!(schedule.interval_seconds, 3600);
        assert_eq!(schedule.pacing.max_delay_ms, 200);
        assert!(schedule.enabled);
    }

    #[test]
    fn test_duplicate_sources_rejected() {
        let result = AppConfig::from_toml(
            r#"
[[sources]]
source_name = "board"
interval_seconds = 60

[[sources]]
source_name = "board"
interval_seconds = 120
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_source_interval_rejected() {
        let result = AppConfig::from_toml(
            r#"
[[sources]]
source_name = "board"
interval_seconds = 9223372036854775807
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.worker.worker_id, config.worker.worker_id);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[dispatcher]\ntick_interval_seconds = 45\njitter_ratio = 0.2"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.dispatcher.tick_interval_seconds, 45);
        assert_eq!(config.dispatcher.jitter_ratio, 0.2);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(AppConfig::load(Some("/nonexistent/scrape.toml")).is_err());
    }
}
