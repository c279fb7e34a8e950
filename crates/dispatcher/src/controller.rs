use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info};

use scrape_core::{
    models::{
        Message, PacingConfig, Run, RunExecutionMessage, RunProgress, RunStatus, RunTrigger,
        SourceSchedule,
    },
    traits::{
        EnqueueRunRequest, MessageQueue, RunControlService, RunRepository,
        SourceScheduleRepository,
    },
    SchedulerError, SchedulerResult,
};
use scrape_infrastructure::{MetricsCollector, StructuredLogger};

/// 把覆盖参数浅合并到基础 payload 上
///
/// 顶层键直接替换，不做递归合并。
pub fn merge_payload(base: &Value, overrides: Option<&Value>) -> SchedulerResult<Value> {
    let mut merged = match base {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => {
            return Err(SchedulerError::InvalidSchedule(format!(
                "payload 必须是 JSON 对象: {other}"
            )))
        }
    };

    match overrides {
        None | Some(Value::Null) => {}
        Some(Value::Object(extra)) => {
            for (key, value) in extra {
                merged.insert(key.clone(), value.clone());
            }
        }
        Some(other) => {
            return Err(SchedulerError::InvalidSchedule(format!(
                "payload_overrides 必须是 JSON 对象: {other}"
            )))
        }
    }

    Ok(Value::Object(merged))
}

/// 运行控制面实现
///
/// 手动触发绕过调度器，但同样写入运行记录并经过队列，由执行器加锁执行。
pub struct RunController {
    schedule_repo: Arc<dyn SourceScheduleRepository>,
    run_repo: Arc<dyn RunRepository>,
    message_queue: Arc<dyn MessageQueue>,
    run_queue: String,
    /// 没有调度配置的临时运行使用的节奏与重试次数
    default_pacing: PacingConfig,
    default_max_retries: i32,
    metrics: MetricsCollector,
}

impl RunController {
    pub fn new(
        schedule_repo: Arc<dyn SourceScheduleRepository>,
        run_repo: Arc<dyn RunRepository>,
        message_queue: Arc<dyn MessageQueue>,
        run_queue: impl Into<String>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            schedule_repo,
            run_repo,
            message_queue,
            run_queue: run_queue.into(),
            default_pacing: PacingConfig::default(),
            default_max_retries: 2,
            metrics,
        }
    }

    pub fn with_defaults(mut self, pacing: PacingConfig, max_retries: i32) -> Self {
        self.default_pacing = pacing;
        self.default_max_retries = max_retries;
        self
    }

    /// 调用方指定的 `run_id` 已存在时复用，属于其他源时拒绝
    fn reuse_existing(existing: Run, source_name: &str) -> SchedulerResult<String> {
        if existing.source_name != source_name {
            return Err(SchedulerError::RunIdConflict {
                run_id: existing.run_id,
                source_name: existing.source_name,
            });
        }
        info!(run_id = %existing.run_id, source_name, "运行已存在，忽略重复提交");
        Ok(existing.run_id)
    }

    async fn require_schedule(&self, source_name: &str) -> SchedulerResult<SourceSchedule> {
        self.schedule_repo
            .get(source_name)
            .await?
            .ok_or_else(|| SchedulerError::ScheduleNotFound {
                source_name: source_name.to_string(),
            })
    }
}

#[async_trait]
impl RunControlService for RunController {
    async fn enqueue_run(
        &self,
        source_name: &str,
        request: EnqueueRunRequest,
    ) -> SchedulerResult<String> {
        if source_name.trim().is_empty() {
            return Err(SchedulerError::InvalidSchedule(
                "source_name 不能为空".to_string(),
            ));
        }

        if let Some(run_id) = request.run_id.as_deref() {
            if run_id.trim().is_empty() {
                return Err(SchedulerError::InvalidSchedule("run_id 不能为空".to_string()));
            }
            if let Some(existing) = self.run_repo.get_by_id(run_id).await? {
                return Self::reuse_existing(existing, source_name);
            }
        }

        let schedule = self.schedule_repo.get(source_name).await?;
        let (base_payload, source_ref, pacing, max_retries) = match &schedule {
            Some(schedule) => (
                schedule.payload.clone(),
                Some(schedule.source_name.clone()),
                schedule.pacing,
                schedule.max_retries,
            ),
            None => (
                Value::Object(serde_json::Map::new()),
                None,
                self.default_pacing,
                self.default_max_retries,
            ),
        };
        let payload = merge_payload(&base_payload, request.payload_overrides.as_ref())?;

        let caller_run_id = request.run_id.is_some();
        let run_id = request.run_id.unwrap_or_else(Run::generate_id);
        let run = Run::new(run_id, source_name, source_ref, RunTrigger::Manual, payload);
        let run = match self.run_repo.create(&run).await {
            Ok(run) => run,
            // 并发提交同一个 run_id 时以先写入的为准
            Err(e) if caller_run_id && e.is_unique_violation() => {
                let existing = self.get_run_status(&run.run_id).await?;
                return Self::reuse_existing(existing, source_name);
            }
            Err(e) => return Err(e),
        };

        let message = Message::run_execution(RunExecutionMessage::for_run(&run, pacing, max_retries));
        if let Err(e) = self
            .message_queue
            .publish_message(&self.run_queue, &message)
            .await
        {
            error!(run_id = %run.run_id, source_name, "手动运行入队失败: {}", e);
            self.run_repo
                .finish(
                    &run.run_id,
                    RunStatus::Failed,
                    &RunProgress::default(),
                    Some(&format!("enqueue failed: {e}")),
                )
                .await?;
            return Err(e);
        }

        self.metrics
            .record_run_scheduled(source_name, run.trigger.as_str());
        StructuredLogger::log_run_scheduled(&run.run_id, source_name, run.trigger.as_str(), None);

        Ok(run.run_id)
    }

    async fn get_run_status(&self, run_id: &str) -> SchedulerResult<Run> {
        self.run_repo
            .get_by_id(run_id)
            .await?
            .ok_or_else(|| SchedulerError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    async fn list_runs(&self, source_name: &str, limit: i64) -> SchedulerResult<Vec<Run>> {
        self.run_repo.list_by_source(source_name, limit.clamp(1, 500)).await
    }

    async fn list_schedules(&self) -> SchedulerResult<Vec<SourceSchedule>> {
        self.schedule_repo.list().await
    }

    async fn get_schedule(&self, source_name: &str) -> SchedulerResult<SourceSchedule> {
        self.require_schedule(source_name).await
    }

    async fn upsert_schedule(&self, schedule: SourceSchedule) -> SchedulerResult<SourceSchedule> {
        schedule.validate()?;
        let saved = self.schedule_repo.upsert(&schedule).await?;
        info!(source_name = %saved.source_name, enabled = saved.enabled, "调度配置已更新");
        Ok(saved)
    }

    async fn enable(&self, source_name: &str) -> SchedulerResult<SourceSchedule> {
        let schedule = self.schedule_repo.set_enabled(source_name, true).await?;
        info!(source_name, "抓取源已启用");
        Ok(schedule)
    }

    async fn disable(&self, source_name: &str) -> SchedulerResult<SourceSchedule> {
        let schedule = self.schedule_repo.set_enabled(source_name, false).await?;
        info!(source_name, "抓取源已禁用");
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_is_shallow() {
        let base = json!({"query": "rust", "filters": {"remote": true, "level": "senior"}});
        let merged = merge_payload(&base, Some(&json!({"filters": {"remote": false}}))).unwrap();
        assert_eq!(merged, json!({"query": "rust", "filters": {"remote": false}}));
    }

    #[test]
    fn test_merge_without_overrides() {
        let base = json!({"query": "rust"});
        assert_eq!(merge_payload(&base, None).unwrap(), base);
        assert_eq!(merge_payload(&base, Some(&Value::Null)).unwrap(), base);
    }

    #[test]
    fn test_non_object_overrides_rejected() {
        let base = json!({});
        assert!(merge_payload(&base, Some(&json!([1, 2]))).is_err());
        assert!(merge_payload(&base, Some(&json!("pages=3"))).is_err());
    }
}
