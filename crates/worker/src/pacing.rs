use std::time::Duration;

use rand::Rng;
use scrape_core::models::PacingConfig;

/// 单元之间的随机暂停
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    config: PacingConfig,
}

impl Pacer {
    pub fn new(config: PacingConfig) -> Self {
        Self { config }
    }

    /// 从 `[min_delay_ms, max_delay_ms]` 均匀抽样
    pub fn next_delay<R: Rng>(&self, rng: &mut R) -> Duration {
        let PacingConfig {
            min_delay_ms,
            max_delay_ms,
        } = self.config;

        if self.config.is_disabled() {
            return Duration::ZERO;
        }
        if min_delay_ms >= max_delay_ms {
            return Duration::from_millis(max_delay_ms);
        }
        Duration::from_millis(rng.random_range(min_delay_ms..=max_delay_ms))
    }

    pub async fn pause(&self) {
        let delay = self.next_delay(&mut rand::rng());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
