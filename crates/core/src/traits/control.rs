use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Run, SourceSchedule};
use crate::SchedulerResult;

/// 手动触发请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueRunRequest {
    /// 调用方指定的运行ID，重复提交时直接返回已有运行
    pub run_id: Option<String>,
    /// 浅合并到调度配置 payload 上的覆盖参数，必须是 JSON 对象
    pub payload_overrides: Option<serde_json::Value>,
}

/// 运行控制面：手动触发、状态查询与调度配置管理
///
/// HTTP 层只依赖这个接口。
#[async_trait]
pub trait RunControlService: Send + Sync {
    /// 手动触发一次运行，绕过调度器，但仍经过队列与锁协调器
    async fn enqueue_run(
        &self,
        source_name: &str,
        request: EnqueueRunRequest,
    ) -> SchedulerResult<String>;

    async fn get_run_status(&self, run_id: &str) -> SchedulerResult<Run>;

    async fn list_runs(&self, source_name: &str, limit: i64) -> SchedulerResult<Vec<Run>>;

    async fn list_schedules(&self) -> SchedulerResult<Vec<SourceSchedule>>;

    async fn get_schedule(&self, source_name: &str) -> SchedulerResult<SourceSchedule>;

    /// 新建或更新调度配置，已存在时保留调度状态
    async fn upsert_schedule(&self, schedule: SourceSchedule) -> SchedulerResult<SourceSchedule>;

    async fn enable(&self, source_name: &str) -> SchedulerResult<SourceSchedule>;

    async fn disable(&self, source_name: &str) -> SchedulerResult<SourceSchedule>;
}
