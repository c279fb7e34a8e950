use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use scrape_core::{
    config::{DispatcherConfig, LockConfig},
    models::{
        Message, Run, RunExecutionMessage, RunProgress, RunStatus, SourceSchedule,
        INTERRUPTED_MESSAGE,
    },
    traits::{LockCoordinator, MessageQueue, RunRepository, SourceScheduleRepository},
    SchedulerResult,
};
use scrape_infrastructure::{MetricsCollector, StructuredLogger};

use crate::jitter::compute_next_run_at;

/// 调度器探测锁的存活时间，探测后立即释放
const PROBE_LOCK_TTL: Duration = Duration::from_secs(5);

/// 单个到期源的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled { run_id: String },
    /// 源锁被正在运行的执行器持有，保留 `next_run_at` 等下一轮
    SkippedBusy,
    /// 另一个调度实例已经推进了 `next_run_at`
    LostRace,
    /// 运行已创建但入队失败，运行被标记为失败
    EnqueueFailed { run_id: String },
}

/// 一次调度扫描的汇总
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// 本轮回收的中断运行
    pub recovered: Vec<String>,
    pub due: usize,
    pub scheduled: Vec<String>,
    pub skipped_busy: usize,
    pub lost_race: usize,
    pub enqueue_failed: usize,
    pub errors: usize,
}

impl TickReport {
    fn record(&mut self, outcome: ScheduleOutcome) {
        match outcome {
            ScheduleOutcome::Scheduled { run_id } => self.scheduled.push(run_id),
            ScheduleOutcome::SkippedBusy => self.skipped_busy += 1,
            ScheduleOutcome::LostRace => self.lost_race += 1,
            ScheduleOutcome::EnqueueFailed { .. } => self.enqueue_failed += 1,
        }
    }
}

/// 周期性扫描到期的抓取源并入队运行
///
/// 调度状态（`last_run_at`/`next_run_at`）与运行记录在同一个事务中写入，
/// 多个调度实例同时运行时也不会重复入队。
pub struct SourceScheduler {
    schedule_repo: Arc<dyn SourceScheduleRepository>,
    run_repo: Arc<dyn RunRepository>,
    message_queue: Arc<dyn MessageQueue>,
    lock_coordinator: Arc<dyn LockCoordinator>,
    run_queue: String,
    config: DispatcherConfig,
    stale_run_after: Duration,
    metrics: MetricsCollector,
}

impl SourceScheduler {
    pub fn new(
        schedule_repo: Arc<dyn SourceScheduleRepository>,
        run_repo: Arc<dyn RunRepository>,
        message_queue: Arc<dyn MessageQueue>,
        lock_coordinator: Arc<dyn LockCoordinator>,
        run_queue: impl Into<String>,
        config: DispatcherConfig,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            schedule_repo,
            run_repo,
            message_queue,
            lock_coordinator,
            run_queue: run_queue.into(),
            stale_run_after: config.stale_run_after(LockConfig::default().ttl()),
            config,
            metrics,
        }
    }

    /// 按实际使用的锁 TTL 设置中断运行的判定时间
    pub fn with_stale_run_after(mut self, stale_run_after: Duration) -> Self {
        self.stale_run_after = stale_run_after;
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub async fn tick(&self) -> SchedulerResult<TickReport> {
        self.tick_at(Utc::now()).await
    }

    /// 以给定时刻执行一次扫描，先回收中断的运行，再调度到期的源
    pub async fn tick_at(&self, now: DateTime<Utc>) -> SchedulerResult<TickReport> {
        let started = Instant::now();
        let recovered = match self.recover_stale_runs_at(now).await {
            Ok(recovered) => recovered,
            Err(e) => {
                error!("回收中断运行失败: {}", e);
                Vec::new()
            }
        };

        let due = self
            .schedule_repo
            .find_due(now, self.config.max_sources_per_tick)
            .await?;

        let mut report = TickReport {
            recovered,
            due: due.len(),
            ..TickReport::default()
        };

        for schedule in &due {
            match self.schedule_source(schedule, now).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!(source_name = %schedule.source_name, "调度抓取源失败: {}", e);
                    report.errors += 1;
                }
            }
        }

        self.metrics
            .record_tick_duration(started.elapsed().as_secs_f64());
        if report.due > 0 || !report.recovered.is_empty() {
            info!(
                recovered = report.recovered.len(),
                due = report.due,
                scheduled = report.scheduled.len(),
                skipped_busy = report.skipped_busy,
                lost_race = report.lost_race,
                "调度扫描完成"
            );
        } else {
            debug!("没有到期的抓取源");
        }

        Ok(report)
    }

    async fn schedule_source(
        &self,
        schedule: &SourceSchedule,
        now: DateTime<Utc>,
    ) -> SchedulerResult<ScheduleOutcome> {
        let source_name = schedule.source_name.as_str();

        if self.is_source_busy(source_name).await {
            self.metrics.record_schedule_skipped(source_name, "busy");
            return Ok(ScheduleOutcome::SkippedBusy);
        }

        let next_run_at = compute_next_run_at(
            now,
            schedule.interval(),
            self.config.jitter_ratio,
            &mut rand::rng(),
        )?;
        let run = Run::scheduled(schedule);

        let advanced = self
            .schedule_repo
            .advance_and_create_run(source_name, now, next_run_at, &run)
            .await?;
        if !advanced {
            debug!(source_name, "next_run_at 已被其他调度实例推进");
            self.metrics.record_schedule_skipped(source_name, "lost_race");
            return Ok(ScheduleOutcome::LostRace);
        }

        let message = Message::run_execution(RunExecutionMessage::for_run(
            &run,
            schedule.pacing,
            schedule.max_retries,
        ));
        if let Err(e) = self
            .message_queue
            .publish_message(&self.run_queue, &message)
            .await
        {
            error!(source_name, run_id = %run.run_id, "运行入队失败: {}", e);
            self.metrics
                .record_schedule_skipped(source_name, "enqueue_failed");
            self.run_repo
                .finish(
                    &run.run_id,
                    RunStatus::Failed,
                    &RunProgress::default(),
                    Some(&format!("enqueue failed: {e}")),
                )
                .await?;
            return Ok(ScheduleOutcome::EnqueueFailed { run_id: run.run_id });
        }

        self.metrics
            .record_run_scheduled(source_name, run.trigger.as_str());
        StructuredLogger::log_run_scheduled(
            &run.run_id,
            source_name,
            run.trigger.as_str(),
            Some(next_run_at),
        );

        Ok(ScheduleOutcome::Scheduled { run_id: run.run_id })
    }

    /// 回收执行器中断后残留的运行
    ///
    /// 开始时间早于 `now - stale_run_after` 且源锁空闲的 `running` 运行被标记为
    /// `failed`/`interrupted`。源锁仍被持有或锁后端异常时保持原状。
    pub async fn recover_stale_runs_at(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<String>> {
        let Some(cutoff) = chrono::Duration::from_std(self.stale_run_after)
            .ok()
            .and_then(|threshold| now.checked_sub_signed(threshold))
        else {
            return Ok(Vec::new());
        };

        let stale = self.run_repo.find_running_started_before(cutoff).await?;
        let mut recovered = Vec::new();

        for run in stale {
            let holder = format!("scheduler-recovery-{}", Uuid::new_v4());
            match self
                .lock_coordinator
                .acquire(&run.source_name, &holder, PROBE_LOCK_TTL)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!(run_id = %run.run_id, source_name = %run.source_name, "源锁仍被持有，运行未中断");
                    continue;
                }
                Err(e) => {
                    warn!(run_id = %run.run_id, source_name = %run.source_name, "探测源锁失败，跳过回收: {}", e);
                    continue;
                }
            }

            let result = self
                .run_repo
                .finish(
                    &run.run_id,
                    RunStatus::Failed,
                    &run.progress(),
                    Some(INTERRUPTED_MESSAGE),
                )
                .await;

            if let Err(e) = self.lock_coordinator.release(&run.source_name, &holder).await {
                warn!(source_name = %run.source_name, "释放回收探测锁失败: {}", e);
            }

            match result {
                Ok(()) => {
                    warn!(
                        run_id = %run.run_id,
                        source_name = %run.source_name,
                        started_at = ?run.started_at,
                        "运行已中断，标记为失败"
                    );
                    self.metrics.record_run_recovered(&run.source_name);
                    recovered.push(run.run_id);
                }
                // 执行器在探测期间自行结束了运行
                Err(e) => debug!(run_id = %run.run_id, "回收运行时状态已变化: {}", e),
            }
        }

        Ok(recovered)
    }

    /// 探测源锁是否被占用
    ///
    /// 只是避免把注定失败的运行放进队列；执行器仍会自己加锁。
    /// 锁后端异常时按未占用处理。
    async fn is_source_busy(&self, source_name: &str) -> bool {
        let holder = format!("scheduler-probe-{}", Uuid::new_v4());
        match self
            .lock_coordinator
            .acquire(source_name, &holder, PROBE_LOCK_TTL)
            .await
        {
            Ok(true) => {
                if let Err(e) = self.lock_coordinator.release(source_name, &holder).await {
                    warn!(source_name, "释放探测锁失败: {}", e);
                }
                false
            }
            Ok(false) => {
                debug!(source_name, "抓取源正在运行，跳过本轮调度");
                true
            }
            Err(e) => {
                warn!(source_name, "探测源锁失败，继续调度: {}", e);
                false
            }
        }
    }

    /// 按固定间隔循环扫描，直到收到关闭信号
    ///
    /// 第一次扫描在启动时立即执行，上次进程残留的中断运行随之回收。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.tick_interval_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            tick_interval_seconds = self.config.tick_interval_seconds,
            jitter_ratio = self.config.jitter_ratio,
            "调度器已启动"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("调度扫描失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("调度器收到关闭信号");
                    break;
                }
            }
        }
    }
}
