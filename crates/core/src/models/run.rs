use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SourceSchedule;

/// 锁竞争失败时写入运行记录的固定消息
pub const SOURCE_BUSY_MESSAGE: &str = "source busy";

/// 执行器中断后由调度器回收的运行写入的消息
pub const INTERRUPTED_MESSAGE: &str = "interrupted";

/// 运行触发方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunTrigger {
    Schedule,
    Manual,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Schedule => "schedule",
            RunTrigger::Manual => "manual",
        }
    }
}

impl FromStr for RunTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "schedule" => Ok(RunTrigger::Schedule),
            "manual" => Ok(RunTrigger::Manual),
            _ => Err(format!("Invalid run trigger: {s}")),
        }
    }
}

/// 运行状态
///
/// `queued → running → {succeeded | partial | failed}`，另外允许
/// `queued → failed`（锁竞争失败或运行开始前的致命错误）。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Partial | RunStatus::Failed
        )
    }

    /// 状态转换是否合法，任何状态都不可重入
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Queued, RunStatus::Running)
                | (RunStatus::Queued, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Succeeded)
                | (RunStatus::Running, RunStatus::Partial)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }

    /// 根据单元错误率计算运行结束状态
    ///
    /// 零错误为 `succeeded`；`errors_count / requested_units <= error_tolerance`
    /// 为 `partial`；超过容忍度为 `failed`。
    pub fn classify(requested_units: i32, errors_count: i32, error_tolerance: f64) -> RunStatus {
        if errors_count <= 0 {
            return RunStatus::Succeeded;
        }
        if requested_units <= 0 {
            return RunStatus::Failed;
        }
        let ratio = f64::from(errors_count) / f64::from(requested_units);
        if ratio <= error_tolerance + 1e-9 {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "partial" => Ok(RunStatus::Partial),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(format!("Invalid run status: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for RunStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for RunStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<RunStatus>().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for RunStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

impl sqlx::Type<sqlx::Sqlite> for RunTrigger {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for RunTrigger {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<RunTrigger>().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for RunTrigger {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 运行进度计数
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunProgress {
    pub requested_units: i32,
    pub completed_units: i32,
    pub errors_count: i32,
}

impl RunProgress {
    pub fn new(requested_units: i32) -> Self {
        Self {
            requested_units,
            ..Self::default()
        }
    }

    /// 按错误率计算终态
    pub fn classify(&self, error_tolerance: f64) -> RunStatus {
        RunStatus::classify(self.requested_units, self.errors_count, error_tolerance)
    }
}

/// 运行实例
///
/// 一次执行尝试的审计记录。`source_ref` 指向调度配置，手动的临时运行可以为空；
/// `source_name` 始终存在，用于加锁与实体归属。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub run_id: String,
    pub source_name: String,
    pub source_ref: Option<String>,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    pub payload: serde_json::Value,
    pub requested_units: i32,
    pub completed_units: i32,
    pub errors_count: i32,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(
        run_id: impl Into<String>,
        source_name: impl Into<String>,
        source_ref: Option<String>,
        trigger: RunTrigger,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            source_name: source_name.into(),
            source_ref,
            trigger,
            status: RunStatus::Queued,
            payload,
            requested_units: 0,
            completed_units: 0,
            errors_count: 0,
            message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// 由调度器为到期的调度配置创建运行
    pub fn scheduled(schedule: &SourceSchedule) -> Self {
        Self::new(
            Self::generate_id(),
            schedule.source_name.clone(),
            Some(schedule.source_name.clone()),
            RunTrigger::Schedule,
            schedule.payload.clone(),
        )
    }

    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// `finished_at` 设置后运行不可变
    pub fn is_terminal(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn is_source_busy(&self) -> bool {
        self.status == RunStatus::Failed && self.message.as_deref() == Some(SOURCE_BUSY_MESSAGE)
    }

    pub fn progress(&self) -> RunProgress {
        RunProgress {
            requested_units: self.requested_units,
            completed_units: self.completed_units,
            errors_count: self.errors_count,
        }
    }

    pub fn execution_duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => Some((finished - started).num_milliseconds()),
            _ => None,
        }
    }
}
