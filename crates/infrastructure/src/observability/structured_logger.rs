//! 运行生命周期的结构化日志事件

use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// 结构化日志工具
///
/// 每个事件带固定的 `event` 字段，便于在 JSON 日志中检索。
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_run_scheduled(
        run_id: &str,
        source_name: &str,
        trigger: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) {
        info!(
            event = "run_scheduled",
            run.id = run_id,
            source.name = source_name,
            run.trigger = trigger,
            source.next_run_at = ?next_run_at,
            "Run scheduled"
        );
    }

    pub fn log_run_started(run_id: &str, source_name: &str, worker_id: &str) {
        info!(
            event = "run_started",
            run.id = run_id,
            source.name = source_name,
            worker.id = worker_id,
            "Run started"
        );
    }

    pub fn log_run_finished(
        run_id: &str,
        source_name: &str,
        status: &str,
        completed_units: i32,
        errors_count: i32,
        duration_ms: u64,
    ) {
        info!(
            event = "run_finished",
            run.id = run_id,
            source.name = source_name,
            run.status = status,
            run.completed_units = completed_units,
            run.errors_count = errors_count,
            run.duration_ms = duration_ms,
            "Run finished"
        );
    }

    pub fn log_source_busy(run_id: &str, source_name: &str, holder: Option<&str>) {
        warn!(
            event = "source_busy",
            run.id = run_id,
            source.name = source_name,
            lock.holder = holder.unwrap_or("unknown"),
            "Source lock held by another run"
        );
    }

    pub fn log_batch_persisted(
        run_id: &str,
        source_name: &str,
        inserted: u64,
        skipped_duplicates: u64,
        errors: u64,
    ) {
        info!(
            event = "batch_persisted",
            run.id = run_id,
            source.name = source_name,
            batch.inserted = inserted,
            batch.skipped_duplicates = skipped_duplicates,
            batch.errors = errors,
            "Batch persisted"
        );
    }
}
