//! 数据仓储层接口定义
//!
//! - `SourceScheduleRepository` - 抓取源调度配置，只有调度器推进调度状态
//! - `RunRepository` - 运行实例的生命周期管理，只有持有运行的执行器修改它
//! - `EntityRepository` - 抓取实体的幂等批量写入
//!
//! 所有接口返回 `SchedulerResult<T>`，并要求 `Send + Sync`。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    PersistOutcome, RawRecord, Run, RunProgress, RunStatus, ScrapedEntity, SourceSchedule,
};
use crate::SchedulerResult;

/// 抓取源调度配置仓储接口
#[async_trait]
pub trait SourceScheduleRepository: Send + Sync {
    /// 新建或更新调度配置
    ///
    /// 已存在的配置只更新可调参数（间隔、payload、节奏、重试、启用状态），
    /// `last_run_at` 与 `next_run_at` 保持不变。
    async fn upsert(&self, schedule: &SourceSchedule) -> SchedulerResult<SourceSchedule>;

    async fn get(&self, source_name: &str) -> SchedulerResult<Option<SourceSchedule>>;

    async fn list(&self) -> SchedulerResult<Vec<SourceSchedule>>;

    /// 查询已启用且 `next_run_at <= now` 的配置，按 `next_run_at` 升序
    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: Option<i64>,
    ) -> SchedulerResult<Vec<SourceSchedule>>;

    async fn set_enabled(&self, source_name: &str, enabled: bool)
        -> SchedulerResult<SourceSchedule>;

    /// 在同一个事务里推进调度状态并创建运行
    ///
    /// 只有配置仍然启用且 `next_run_at <= now` 时才会推进；返回 `false`
    /// 表示已被其他调度实例推进过，此时不会创建运行。
    async fn advance_and_create_run(
        &self,
        source_name: &str,
        now: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
        run: &Run,
    ) -> SchedulerResult<bool>;

    async fn delete(&self, source_name: &str) -> SchedulerResult<bool>;
}

/// 运行实例仓储接口
#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn create(&self, run: &Run) -> SchedulerResult<Run>;

    async fn get_by_id(&self, run_id: &str) -> SchedulerResult<Option<Run>>;

    /// 按创建时间倒序列出某个源的运行
    async fn list_by_source(&self, source_name: &str, limit: i64) -> SchedulerResult<Vec<Run>>;

    /// 查询 `started_at <= cutoff` 且仍处于 `running` 的运行，按开始时间升序
    async fn find_running_started_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> SchedulerResult<Vec<Run>>;

    /// `queued → running`，写入 `started_at`
    async fn mark_running(&self, run_id: &str) -> SchedulerResult<()>;

    /// 更新运行中的进度计数
    async fn update_progress(&self, run_id: &str, progress: &RunProgress) -> SchedulerResult<()>;

    /// 写入终态与 `finished_at`
    ///
    /// 转换必须满足 `RunStatus::can_transition_to`，已结束的运行不会被修改。
    async fn finish(
        &self,
        run_id: &str,
        status: RunStatus,
        progress: &RunProgress,
        message: Option<&str>,
    ) -> SchedulerResult<()>;
}

/// 抓取实体仓储接口
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// 幂等批量写入
    ///
    /// 先逐条校验，不合法的记录计入 `errors` 而不影响其他记录；
    /// 合法记录在一个事务中以冲突即忽略的方式插入，重复键计入 `skipped_duplicates`。
    async fn persist_batch(
        &self,
        records: &[RawRecord],
        source_name: &str,
        run_id: Option<&str>,
    ) -> SchedulerResult<PersistOutcome>;

    async fn count_entities(&self, source_name: &str) -> SchedulerResult<i64>;

    async fn get_entity(
        &self,
        source_name: &str,
        item_url: &str,
    ) -> SchedulerResult<Option<ScrapedEntity>>;
}
