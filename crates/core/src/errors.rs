use thiserror::Error;

use crate::models::RunStatus;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("抓取源调度配置未找到: {source_name}")]
    ScheduleNotFound { source_name: String },

    #[error("运行实例未找到: {run_id}")]
    RunNotFound { run_id: String },

    #[error("无效的调度配置: {0}")]
    InvalidSchedule(String),

    #[error("非法的运行状态转换: {run_id} {from:?} -> {to:?}")]
    InvalidRunTransition {
        run_id: String,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("运行 {run_id} 已属于抓取源 {source_name}")]
    RunIdConflict { run_id: String, source_name: String },

    #[error("锁协调器错误: {0}")]
    LockCoordinator(String),

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("抓取执行错误: {0}")]
    Extraction(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl SchedulerError {
    /// 是否为“资源不存在”类错误
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SchedulerError::ScheduleNotFound { .. } | SchedulerError::RunNotFound { .. }
        )
    }

    /// 是否为唯一约束冲突
    pub fn is_unique_violation(&self) -> bool {
        match self {
            SchedulerError::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

/// 抽取函数返回的单元级错误
///
/// `Transient` 只影响当前单元（按重试预算重试后计入错误率），
/// `Fatal` 表示整个运行无法继续（源不可达、配置无效）。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("临时错误: {0}")]
    Transient(String),

    #[error("致命错误: {0}")]
    Fatal(String),
}

impl ExtractionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExtractionError::Fatal(_))
    }
}

impl From<ExtractionError> for SchedulerError {
    fn from(err: ExtractionError) -> Self {
        SchedulerError::Extraction(err.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, SchedulerError>;
