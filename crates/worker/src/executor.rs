use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use scrape_core::{
    config::{LockConfig, WorkerConfig},
    models::{
        PersistOutcome, RawRecord, Run, RunExecutionMessage, RunProgress, RunStatus,
        SOURCE_BUSY_MESSAGE,
    },
    traits::{EntityRepository, ExtractionRequest, Extractor, LockCoordinator, RunRepository},
    ExtractionError, SchedulerResult,
};
use scrape_infrastructure::{MetricsCollector, StructuredLogger};

use crate::extractors::ExtractorRegistry;
use crate::heartbeat::LockHeartbeat;
use crate::pacing::Pacer;

/// 执行器参数
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// `partial` 允许的最大单元错误率
    pub error_tolerance: f64,
    pub persist_batch_size: usize,
    pub lock_ttl: Duration,
    pub lock_refresh_interval: Duration,
    /// 临时错误重试前的等待，按尝试次数线性增长
    pub retry_backoff: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            error_tolerance: 0.30,
            persist_batch_size: 100,
            lock_ttl: Duration::from_secs(60),
            lock_refresh_interval: Duration::from_secs(20),
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl ExecutorSettings {
    pub fn from_config(worker: &WorkerConfig, lock: &LockConfig) -> Self {
        Self {
            error_tolerance: worker.error_tolerance,
            persist_batch_size: worker.persist_batch_size.max(1),
            lock_ttl: lock.ttl(),
            lock_refresh_interval: lock.refresh_interval(),
            ..Self::default()
        }
    }
}

/// 单次执行的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// 运行不存在或不处于 `queued`（重复投递），直接确认消息
    Skipped { reason: String },
    Finished {
        status: RunStatus,
        progress: RunProgress,
    },
}

impl ExecutionOutcome {
    pub fn status(&self) -> Option<RunStatus> {
        match self {
            ExecutionOutcome::Skipped { .. } => None,
            ExecutionOutcome::Finished { status, .. } => Some(*status),
        }
    }
}

/// 单元循环的汇总
struct UnitsReport {
    progress: RunProgress,
    persisted: PersistOutcome,
    fatal: Option<String>,
}

/// 运行执行器
///
/// 状态机：`queued → running → {succeeded | partial | failed}`。
/// 执行期间持有以 `run_id` 为持有者的源锁，并由后台任务定期续期。
pub struct RunExecutor {
    worker_id: String,
    run_repo: Arc<dyn RunRepository>,
    entity_repo: Arc<dyn EntityRepository>,
    lock_coordinator: Arc<dyn LockCoordinator>,
    extractors: Arc<ExtractorRegistry>,
    settings: ExecutorSettings,
    metrics: MetricsCollector,
}

impl RunExecutor {
    pub fn new(
        worker_id: impl Into<String>,
        run_repo: Arc<dyn RunRepository>,
        entity_repo: Arc<dyn EntityRepository>,
        lock_coordinator: Arc<dyn LockCoordinator>,
        extractors: Arc<ExtractorRegistry>,
        settings: ExecutorSettings,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            run_repo,
            entity_repo,
            lock_coordinator,
            extractors,
            settings,
            metrics,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub async fn execute(&self, message: &RunExecutionMessage) -> SchedulerResult<ExecutionOutcome> {
        let run_id = message.run_id.as_str();

        let Some(run) = self.run_repo.get_by_id(run_id).await? else {
            warn!(run_id, "运行不存在，丢弃消息");
            return Ok(ExecutionOutcome::Skipped {
                reason: "run not found".to_string(),
            });
        };
        if run.status != RunStatus::Queued {
            debug!(run_id, status = %run.status, "运行不处于 queued，忽略重复投递");
            return Ok(ExecutionOutcome::Skipped {
                reason: format!("run is {}", run.status),
            });
        }

        let source_name = run.source_name.as_str();
        match self
            .lock_coordinator
            .acquire(source_name, run_id, self.settings.lock_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => return self.fail_busy(&run).await,
            Err(e) => {
                error!(run_id, source_name, "获取源锁失败: {}", e);
                return self
                    .fail_before_start(&run, &format!("lock unavailable: {e}"))
                    .await;
            }
        }

        let result = self.execute_locked(&run, message).await;

        match self.lock_coordinator.release(source_name, run_id).await {
            Ok(true) => {}
            Ok(false) => warn!(run_id, source_name, "释放源锁时已不再持有"),
            Err(e) => warn!(run_id, source_name, "释放源锁失败: {}", e),
        }

        result
    }

    /// 持锁期间的执行过程，返回前不释放锁
    async fn execute_locked(
        &self,
        run: &Run,
        message: &RunExecutionMessage,
    ) -> SchedulerResult<ExecutionOutcome> {
        let run_id = run.run_id.as_str();
        let source_name = run.source_name.as_str();

        self.run_repo.mark_running(run_id).await?;
        StructuredLogger::log_run_started(run_id, source_name, &self.worker_id);
        let started = Instant::now();

        let heartbeat = LockHeartbeat::spawn(
            self.lock_coordinator.clone(),
            source_name.to_string(),
            run_id.to_string(),
            self.settings.lock_ttl,
            self.settings.lock_refresh_interval,
        );

        let report = self.run_units(run, message, &heartbeat).await;
        if heartbeat.stop().await {
            self.metrics.record_lock_lost(source_name);
        }

        let UnitsReport {
            progress,
            persisted,
            fatal,
        } = report;

        let status = match &fatal {
            Some(_) => RunStatus::Failed,
            None => progress.classify(self.settings.error_tolerance),
        };
        let summary = summarize(&progress, &persisted, fatal.as_deref());

        self.run_repo
            .finish(run_id, status, &progress, Some(&summary))
            .await?;

        let elapsed = started.elapsed();
        self.metrics
            .record_run_finished(source_name, status.as_str(), elapsed.as_secs_f64());
        StructuredLogger::log_run_finished(
            run_id,
            source_name,
            status.as_str(),
            progress.completed_units,
            progress.errors_count,
            elapsed.as_millis() as u64,
        );

        Ok(ExecutionOutcome::Finished { status, progress })
    }

    async fn run_units(
        &self,
        run: &Run,
        message: &RunExecutionMessage,
        heartbeat: &LockHeartbeat,
    ) -> UnitsReport {
        let source_name = run.source_name.as_str();
        let mut report = UnitsReport {
            progress: RunProgress::default(),
            persisted: PersistOutcome::default(),
            fatal: None,
        };

        let Some(extractor) = self.extractors.resolve(source_name) else {
            report.fatal = Some(format!("no extractor registered for source {source_name}"));
            return report;
        };

        let requested = match extractor.plan_units(source_name, &run.payload).await {
            Ok(units) => units,
            Err(e) => {
                report.fatal = Some(e.to_string());
                return report;
            }
        };
        report.progress = RunProgress::new(requested);
        self.save_progress(run, &report.progress).await;

        let pacer = Pacer::new(message.pacing);
        let max_retries = message.max_retries.max(0);
        let mut buffer: Vec<RawRecord> = Vec::new();

        for unit in 0..requested {
            if heartbeat.is_lost() {
                report.fatal = Some("lock lost".to_string());
                break;
            }
            if unit > 0 {
                pacer.pause().await;
            }

            let request = ExtractionRequest {
                run_id: &run.run_id,
                source_name,
                payload: &run.payload,
                unit,
            };
            match self.extract_with_retry(extractor.as_ref(), request, max_retries).await {
                Ok(records) => {
                    report.progress.completed_units += 1;
                    buffer.extend(records);
                }
                Err(e) if e.is_fatal() => {
                    error!(run_id = %run.run_id, source_name, unit, "单元致命错误: {}", e);
                    report.fatal = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    warn!(run_id = %run.run_id, source_name, unit, "单元失败: {}", e);
                    report.progress.errors_count += 1;
                }
            }

            if buffer.len() >= self.settings.persist_batch_size {
                if let Err(e) = self.flush(run, &mut buffer, &mut report.persisted).await {
                    report.fatal = Some(format!("persistence failed: {e}"));
                    break;
                }
            }
            self.save_progress(run, &report.progress).await;
        }

        if report.fatal.is_some() {
            // 未完成的单元计为错误
            let attempted = report.progress.completed_units + report.progress.errors_count;
            report.progress.errors_count += (requested - attempted).max(0);
        }

        // 致命错误前已经抽取到的记录仍然写入
        if !buffer.is_empty() {
            if let Err(e) = self.flush(run, &mut buffer, &mut report.persisted).await {
                report.fatal.get_or_insert(format!("persistence failed: {e}"));
            }
        }

        report
    }

    async fn extract_with_retry(
        &self,
        extractor: &dyn Extractor,
        request: ExtractionRequest<'_>,
        max_retries: i32,
    ) -> Result<Vec<RawRecord>, ExtractionError> {
        let mut attempt = 0;
        loop {
            match extractor.extract_unit(request.clone()).await {
                Ok(records) => return Ok(records),
                Err(e) if !e.is_fatal() && attempt < max_retries => {
                    attempt += 1;
                    self.metrics.record_unit_retry(request.source_name);
                    debug!(
                        run_id = request.run_id,
                        unit = request.unit,
                        attempt,
                        "临时错误，重试: {}",
                        e
                    );
                    let backoff = self.settings.retry_backoff * attempt as u32;
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                }
                Err(e) => {
                    self.metrics
                        .record_unit_error(request.source_name, e.is_fatal());
                    return Err(e);
                }
            }
        }
    }

    async fn flush(
        &self,
        run: &Run,
        buffer: &mut Vec<RawRecord>,
        total: &mut PersistOutcome,
    ) -> SchedulerResult<()> {
        let outcome = self
            .entity_repo
            .persist_batch(buffer.as_slice(), &run.source_name, Some(&run.run_id))
            .await?;
        buffer.clear();

        for rejected in &outcome.rejected {
            debug!(run_id = %run.run_id, index = rejected.index, reason = %rejected.reason, "记录未通过校验");
        }
        self.metrics.record_persist_outcome(
            &run.source_name,
            outcome.inserted,
            outcome.skipped_duplicates,
            outcome.errors,
        );
        StructuredLogger::log_batch_persisted(
            &run.run_id,
            &run.source_name,
            outcome.inserted,
            outcome.skipped_duplicates,
            outcome.errors,
        );
        total.merge(outcome);
        Ok(())
    }

    async fn save_progress(&self, run: &Run, progress: &RunProgress) {
        if let Err(e) = self.run_repo.update_progress(&run.run_id, progress).await {
            warn!(run_id = %run.run_id, "更新运行进度失败: {}", e);
        }
    }

    async fn fail_busy(&self, run: &Run) -> SchedulerResult<ExecutionOutcome> {
        let holder = self
            .lock_coordinator
            .current_holder(&run.source_name)
            .await
            .ok()
            .flatten();
        StructuredLogger::log_source_busy(&run.run_id, &run.source_name, holder.as_deref());
        self.metrics.record_source_busy(&run.source_name);

        let progress = RunProgress::default();
        self.run_repo
            .finish(&run.run_id, RunStatus::Failed, &progress, Some(SOURCE_BUSY_MESSAGE))
            .await?;
        Ok(ExecutionOutcome::Finished {
            status: RunStatus::Failed,
            progress,
        })
    }

    async fn fail_before_start(
        &self,
        run: &Run,
        message: &str,
    ) -> SchedulerResult<ExecutionOutcome> {
        let progress = RunProgress::default();
        self.run_repo
            .finish(&run.run_id, RunStatus::Failed, &progress, Some(message))
            .await?;
        self.metrics
            .record_run_finished(&run.source_name, RunStatus::Failed.as_str(), 0.0);
        info!(run_id = %run.run_id, source_name = %run.source_name, "运行未能开始: {}", message);
        Ok(ExecutionOutcome::Finished {
            status: RunStatus::Failed,
            progress,
        })
    }
}

/// 运行结束时写入 `message` 的摘要
fn summarize(progress: &RunProgress, persisted: &PersistOutcome, fatal: Option<&str>) -> String {
    let counts = format!(
        "units {}/{} ok, {} errors; inserted={} skipped_duplicates={} rejected={}",
        progress.completed_units,
        progress.requested_units,
        progress.errors_count,
        persisted.inserted,
        persisted.skipped_duplicates,
        persisted.errors
    );
    match fatal {
        Some(reason) => format!("{reason}; {counts}"),
        None => counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_format() {
        let progress = RunProgress {
            requested_units: 10,
            completed_units: 7,
            errors_count: 3,
        };
        let persisted = PersistOutcome {
            inserted: 40,
            skipped_duplicates: 2,
            errors: 1,
            rejected: vec![],
        };
        assert_eq!(
            summarize(&progress, &persisted, None),
            "units 7/10 ok, 3 errors; inserted=40 skipped_duplicates=2 rejected=1"
        );
        assert!(summarize(&progress, &persisted, Some("lock lost")).starts_with("lock lost; "));
    }

    #[test]
    fn test_settings_follow_config() {
        let worker = WorkerConfig {
            error_tolerance: 0.5,
            persist_batch_size: 0,
            ..WorkerConfig::default()
        };
        let settings = ExecutorSettings::from_config(&worker, &LockConfig::default());
        assert_eq!(settings.error_tolerance, 0.5);
        assert_eq!(settings.persist_batch_size, 1);
        assert_eq!(settings.lock_ttl, Duration::from_secs(60));
    }
}
