use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scrape_core::SchedulerError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::Scheduler(SchedulerError::ScheduleNotFound { source_name }) => (
                StatusCode::NOT_FOUND,
                "SCHEDULE_NOT_FOUND",
                format!("抓取源 {} 没有调度配置", source_name),
            ),
            ApiError::Scheduler(SchedulerError::RunNotFound { run_id }) => (
                StatusCode::NOT_FOUND,
                "RUN_NOT_FOUND",
                format!("运行 {} 不存在", run_id),
            ),
            ApiError::Scheduler(SchedulerError::RunIdConflict {
                run_id,
                source_name,
            }) => (
                StatusCode::CONFLICT,
                "RUN_ID_CONFLICT",
                format!("运行 {} 已属于抓取源 {}", run_id, source_name),
            ),
            ApiError::Scheduler(SchedulerError::InvalidSchedule(msg)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_SCHEDULE",
                format!("调度配置无效: {}", msg),
            ),
            ApiError::Scheduler(SchedulerError::Configuration(msg)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_CONFIGURATION",
                format!("配置无效: {}", msg),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                format!("请求参数错误: {}", msg),
            ),
            ApiError::Scheduler(e) => {
                error!("请求处理失败: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "系统内部错误".to_string(),
                )
            }
            ApiError::Internal(msg) => {
                error!("请求处理失败: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "系统内部错误".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
