//! 调度与执行指标
//!
//! 基于 `metrics` 门面记录，未安装导出器时所有调用都是空操作。

use metrics::{counter, histogram};
use tracing::debug;

/// 指标收集器
///
/// 不持有状态，克隆成本为零，调度器与执行器各自持有一份。
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    // 调度器指标

    /// 一个运行被创建并入队
    pub fn record_run_scheduled(&self, source_name: &str, trigger: &str) {
        counter!(
            "scrape_runs_scheduled_total",
            "source" => source_name.to_string(),
            "trigger" => trigger.to_string()
        )
        .increment(1);
    }

    /// 到期源被跳过，`reason` 为 `busy`、`lost_race` 或 `enqueue_failed`
    pub fn record_schedule_skipped(&self, source_name: &str, reason: &str) {
        counter!(
            "scrape_schedule_skipped_total",
            "source" => source_name.to_string(),
            "reason" => reason.to_string()
        )
        .increment(1);
        debug!(source_name, reason, "schedule skipped");
    }

    /// 执行器中断后残留在 `running` 的运行被回收
    pub fn record_run_recovered(&self, source_name: &str) {
        counter!(
            "scrape_runs_recovered_total",
            "source" => source_name.to_string()
        )
        .increment(1);
    }

    pub fn record_tick_duration(&self, duration_seconds: f64) {
        histogram!("scrape_scheduler_tick_duration_seconds").record(duration_seconds);
    }

    // 执行器指标

    pub fn record_run_finished(&self, source_name: &str, status: &str, duration_seconds: f64) {
        counter!(
            "scrape_runs_finished_total",
            "source" => source_name.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        histogram!(
            "scrape_run_duration_seconds",
            "source" => source_name.to_string()
        )
        .record(duration_seconds);
    }

    /// 源锁被占用导致运行失败，与其他失败分开计数
    pub fn record_source_busy(&self, source_name: &str) {
        counter!(
            "scrape_source_busy_total",
            "source" => source_name.to_string()
        )
        .increment(1);
    }

    pub fn record_unit_error(&self, source_name: &str, fatal: bool) {
        counter!(
            "scrape_unit_errors_total",
            "source" => source_name.to_string(),
            "kind" => if fatal { "fatal" } else { "transient" }
        )
        .increment(1);
    }

    pub fn record_unit_retry(&self, source_name: &str) {
        counter!(
            "scrape_unit_retries_total",
            "source" => source_name.to_string()
        )
        .increment(1);
    }

    pub fn record_persist_outcome(
        &self,
        source_name: &str,
        inserted: u64,
        skipped_duplicates: u64,
        errors: u64,
    ) {
        let source = source_name.to_string();
        counter!("scrape_entities_inserted_total", "source" => source.clone()).increment(inserted);
        counter!("scrape_entities_duplicate_total", "source" => source.clone())
            .increment(skipped_duplicates);
        counter!("scrape_entities_rejected_total", "source" => source).increment(errors);
    }

    pub fn record_lock_lost(&self, source_name: &str) {
        counter!(
            "scrape_lock_lost_total",
            "source" => source_name.to_string()
        )
        .increment(1);
    }
}
