use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{SchedulerError, SchedulerResult};

/// 调度间隔上限，一年
pub const MAX_INTERVAL_SECONDS: i64 = 366 * 24 * 3600;

/// 单元之间暂停时间的上限，十分钟
pub const MAX_PACING_DELAY_MS: u64 = 10 * 60 * 1000;

/// 单元之间的随机节奏控制
///
/// 执行器在两个抽取单元之间从 `[min_delay_ms, max_delay_ms]` 中均匀抽样暂停时间。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PacingConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl PacingConfig {
    pub fn new(min_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            min_delay_ms,
            max_delay_ms,
        }
    }

    /// 不暂停
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn is_disabled(&self) -> bool {
        self.max_delay_ms == 0
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.max_delay_ms > MAX_PACING_DELAY_MS {
            return Err(SchedulerError::InvalidSchedule(format!(
                "节奏上限 {}ms 超过允许的最大值 {}ms",
                self.max_delay_ms, MAX_PACING_DELAY_MS
            )));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(SchedulerError::InvalidSchedule(format!(
                "节奏下限 {}ms 大于上限 {}ms",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self::new(1_000, 3_000)
    }
}

/// 抓取源调度配置
///
/// 表示一个周期性抓取源。禁用的源不会被自动调度，但仍然可以手动触发。
///
/// # 字段说明
///
/// - `source_name`: 抓取源唯一标识
/// - `enabled`: 是否参与自动调度
/// - `interval_seconds`: 两次运行之间的间隔（秒）
/// - `last_run_at`: 最近一次调度决策的时间
/// - `next_run_at`: 下一次到期时间，调度器只读取这个字段判断是否到期
/// - `payload`: 透传给抽取函数的参数（搜索词、地区、结果数量等）
/// - `pacing`: 单元之间的随机暂停范围
/// - `max_retries`: 临时错误的重试预算
///
/// # 使用示例
///
/// ```rust
/// use scrape_core::models::{PacingConfig, SourceSchedule};
/// use chrono::Duration;
/// use serde_json::json;
///
/// let schedule = SourceSchedule::new("remote-jobs", Duration::minutes(60))
///     .with_payload(json!({"query": "rust", "pages": 3}))
///     .with_pacing(PacingConfig::new(500, 1500))
///     .with_max_retries(2);
/// assert!(schedule.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceSchedule {
    pub source_name: String,
    pub enabled: bool,
    pub interval_seconds: i64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub pacing: PacingConfig,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SourceSchedule {
    /// 创建新的调度配置，默认立即到期
    pub fn new(source_name: impl Into<String>, interval: Duration) -> Self {
        let now = Utc::now();
        Self {
            source_name: source_name.into(),
            enabled: true,
            interval_seconds: interval.num_seconds(),
            last_run_at: None,
            next_run_at: now,
            payload: serde_json::json!({}),
            pacing: PacingConfig::default(),
            max_retries: 2,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_next_run_at(mut self, next_run_at: DateTime<Utc>) -> Self {
        self.next_run_at = next_run_at;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// 直接设置间隔秒数，超出范围的值留给 `validate` 拒绝
    pub fn with_interval_seconds(mut self, interval_seconds: i64) -> Self {
        self.interval_seconds = interval_seconds;
        self
    }

    /// 调度间隔，越界的存储值被截断到 `[0, MAX_INTERVAL_SECONDS]`
    pub fn interval(&self) -> Duration {
        Duration::try_seconds(self.interval_seconds.clamp(0, MAX_INTERVAL_SECONDS))
            .unwrap_or_else(Duration::zero)
    }

    /// 检查调度配置在给定时间是否到期
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run_at <= now
    }

    /// 校验调度配置
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.source_name.trim().is_empty() {
            return Err(SchedulerError::InvalidSchedule(
                "source_name 不能为空".to_string(),
            ));
        }
        if self.interval_seconds <= 0 {
            return Err(SchedulerError::InvalidSchedule(format!(
                "{} 的调度间隔必须大于0",
                self.source_name
            )));
        }
        if self.interval_seconds > MAX_INTERVAL_SECONDS {
            return Err(SchedulerError::InvalidSchedule(format!(
                "{} 的调度间隔 {}s 超过上限 {}s",
                self.source_name, self.interval_seconds, MAX_INTERVAL_SECONDS
            )));
        }
        if self.max_retries < 0 {
            return Err(SchedulerError::InvalidSchedule(format!(
                "{} 的重试次数不能为负数",
                self.source_name
            )));
        }
        if !self.payload.is_object() {
            return Err(SchedulerError::InvalidSchedule(format!(
                "{} 的 payload 必须是 JSON 对象",
                self.source_name
            )));
        }
        self.pacing.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_schedule_is_due_immediately() {
        let schedule = SourceSchedule::new("board", Duration::minutes(30));
        assert!(schedule.is_due(Utc::now()));
        assert_eq!(schedule.interval(), Duration::minutes(30));
    }

    #[test]
    fn test_disabled_schedule_never_due() {
        let schedule = SourceSchedule::new("board", Duration::minutes(30))
            .with_next_run_at(Utc::now() - Duration::hours(1))
            .disabled();
        assert!(!schedule.is_due(Utc::now()));
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let zero_interval = SourceSchedule::new("board", Duration::zero());
        assert!(zero_interval.validate().is_err());

        let bad_pacing = SourceSchedule::new("board", Duration::minutes(1))
            .with_pacing(PacingConfig::new(500, 100));
        assert!(bad_pacing.validate().is_err());

        let bad_payload =
            SourceSchedule::new("board", Duration::minutes(1)).with_payload(json!([1, 2]));
        assert!(bad_payload.validate().is_err());

        let blank_name = SourceSchedule::new("  ", Duration::minutes(1));
        assert!(blank_name.validate().is_err());
    }

    #[test]
    fn test_validate_interval_upper_bound() {
        let at_limit = SourceSchedule::new("board", Duration::minutes(1))
            .with_interval_seconds(MAX_INTERVAL_SECONDS);
        assert!(at_limit.validate().is_ok());

        let too_long = SourceSchedule::new("board", Duration::minutes(1))
            .with_interval_seconds(1_000_000_000_000_000);
        assert!(matches!(
            too_long.validate(),
            Err(SchedulerError::InvalidSchedule(_))
        ));

        let max = SourceSchedule::new("board", Duration::minutes(1)).with_interval_seconds(i64::MAX);
        assert!(max.validate().is_err());
        assert_eq!(max.interval(), Duration::seconds(MAX_INTERVAL_SECONDS));
    }

    #[test]
    fn test_validate_pacing_upper_bound() {
        let at_limit = PacingConfig::new(0, MAX_PACING_DELAY_MS);
        assert!(at_limit.validate().is_ok());

        let too_slow = SourceSchedule::new("board", Duration::minutes(1))
            .with_pacing(PacingConfig::new(0, u64::MAX));
        assert!(too_slow.validate().is_err());
    }
}
