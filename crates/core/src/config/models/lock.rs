use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockBackendType {
    #[default]
    Memory,
    Redis,
}

/// 源锁配置
///
/// `refresh_interval_seconds` 必须小于 `ttl_seconds`，否则长时间运行会在
/// 续期之前丢失锁。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub backend: LockBackendType,
    pub url: String,
    pub key_prefix: String,
    pub ttl_seconds: u64,
    pub refresh_interval_seconds: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackendType::Memory,
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "scrape:lock:".to_string(),
            ttl_seconds: 60,
            refresh_interval_seconds: 20,
        }
    }
}

impl LockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ttl_seconds == 0 {
            return Err(anyhow::anyhow!("锁TTL必须大于0"));
        }

        if self.refresh_interval_seconds == 0 {
            return Err(anyhow::anyhow!("锁续期间隔必须大于0"));
        }

        if self.refresh_interval_seconds >= self.ttl_seconds {
            return Err(anyhow::anyhow!(
                "锁续期间隔 {}s 必须小于TTL {}s",
                self.refresh_interval_seconds,
                self.ttl_seconds
            ));
        }

        if self.backend == LockBackendType::Redis && !self.url.starts_with("redis://") {
            return Err(anyhow::anyhow!("Redis锁URL格式无效: {}", self.url));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_must_be_shorter_than_ttl() {
        let mut config = LockConfig::default();
        assert!(config.validate().is_ok());

        config.refresh_interval_seconds = 60;
        assert!(config.validate().is_err());
    }
}
