use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::models::{PacingConfig, SourceSchedule};

fn default_enabled() -> bool {
    true
}

fn default_max_retries() -> i32 {
    2
}

/// 启动时写入数据库的抓取源配置
///
/// 已存在的源只更新这些可调参数，调度状态（`next_run_at`）保持不变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSeedConfig {
    pub source_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub interval_seconds: i64,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub pacing: Option<PacingConfig>,
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
}

impl SourceSeedConfig {
    pub fn to_schedule(&self) -> SourceSchedule {
        let mut schedule = SourceSchedule::new(self.source_name.clone(), Duration::zero())
            .with_interval_seconds(self.interval_seconds)
            .with_payload(
                self.payload
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({})),
            )
            .with_pacing(self.pacing.unwrap_or_default())
            .with_max_retries(self.max_retries);
        schedule.enabled = self.enabled;
        schedule
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.to_schedule()
            .validate()
            .map_err(|e| anyhow::anyhow!(e.to_string()))
    }
}
