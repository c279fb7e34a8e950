use serde::{Deserialize, Serialize};

/// Message queue type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageQueueType {
    /// 进程内队列，只适用于单进程部署与测试
    #[default]
    Memory,
    Redis,
}

/// Message queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageQueueConfig {
    pub backend: MessageQueueType,
    pub url: String,
    pub run_queue: String,
    pub poll_interval_ms: u64,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            backend: MessageQueueType::Memory,
            url: "redis://127.0.0.1:6379".to_string(),
            run_queue: "scrape_runs".to_string(),
            poll_interval_ms: 500,
        }
    }
}

impl MessageQueueConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate message queue configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.run_queue.is_empty() {
            return Err(anyhow::anyhow!("运行队列名称不能为空"));
        }

        if self.backend == MessageQueueType::Redis && !self.url.starts_with("redis://") {
            return Err(anyhow::anyhow!("Redis队列URL格式无效: {}", self.url));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("队列轮询间隔必须大于0"));
        }

        Ok(())
    }
}
