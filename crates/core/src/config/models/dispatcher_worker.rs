use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::PacingConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub enabled: bool,
    pub tick_interval_seconds: u64,
    /// 下次运行时间的抖动比例，0.10 表示 ±10%
    pub jitter_ratio: f64,
    pub max_sources_per_tick: Option<i64>,
    /// `running` 超过锁 TTL 的多少倍且源锁空闲时，运行被视为中断
    pub stale_run_ttl_multiplier: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_seconds: 30,
            jitter_ratio: 0.10,
            max_sources_per_tick: None,
            stale_run_ttl_multiplier: 3,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_seconds == 0 {
            return Err(anyhow::anyhow!("调度间隔必须大于0"));
        }

        if !(0.0..1.0).contains(&self.jitter_ratio) {
            return Err(anyhow::anyhow!(
                "抖动比例必须在 [0, 1) 之间: {}",
                self.jitter_ratio
            ));
        }

        if matches!(self.max_sources_per_tick, Some(limit) if limit <= 0) {
            return Err(anyhow::anyhow!("单次调度的最大源数量必须大于0"));
        }

        if self.stale_run_ttl_multiplier == 0 {
            return Err(anyhow::anyhow!("中断运行判定倍数必须大于0"));
        }

        Ok(())
    }

    /// 运行开始多久之后才可能被判定为中断
    pub fn stale_run_after(&self, lock_ttl: Duration) -> Duration {
        lock_ttl.saturating_mul(self.stale_run_ttl_multiplier)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub worker_id: String,
    /// 同时处理的运行数量
    pub concurrency: usize,
    /// `partial` 允许的最大单元错误率
    pub error_tolerance: f64,
    /// 累积多少条记录后写入一次
    pub persist_batch_size: usize,
    /// 没有调度配置的临时运行使用的节奏
    pub default_pacing: PacingConfig,
    pub default_max_retries: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_id: "worker-001".to_string(),
            concurrency: 2,
            error_tolerance: 0.30,
            persist_batch_size: 100,
            default_pacing: PacingConfig::default(),
            default_max_retries: 2,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.is_empty() {
            return Err(anyhow::anyhow!("Worker ID不能为空"));
        }

        if self.concurrency == 0 {
            return Err(anyhow::anyhow!("并发数必须大于0"));
        }

        if !(0.0..=1.0).contains(&self.error_tolerance) {
            return Err(anyhow::anyhow!(
                "错误容忍度必须在 [0, 1] 之间: {}",
                self.error_tolerance
            ));
        }

        if self.persist_batch_size == 0 {
            return Err(anyhow::anyhow!("持久化批大小必须大于0"));
        }

        if self.default_max_retries < 0 {
            return Err(anyhow::anyhow!("默认重试次数不能为负数"));
        }

        self.default_pacing
            .validate()
            .map_err(|e| anyhow::anyhow!(e.to_string()))
    }
}
