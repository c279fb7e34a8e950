use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Duration;
use serde::Deserialize;
use tracing::info;

use scrape_core::models::{PacingConfig, SourceSchedule};

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

const DEFAULT_RUN_LIMIT: i64 = 20;

/// 调度配置写入请求，抓取源名称取自路径
#[derive(Debug, Deserialize)]
pub struct UpsertScheduleRequest {
    pub interval_seconds: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub pacing: Option<PacingConfig>,
    #[serde(default)]
    pub max_retries: Option<i32>,
}

fn default_enabled() -> bool {
    true
}

impl UpsertScheduleRequest {
    fn into_schedule(self, source_name: String) -> ApiResult<SourceSchedule> {
        let interval = Duration::try_seconds(self.interval_seconds).ok_or_else(|| {
            ApiError::BadRequest(format!("调度间隔超出范围: {}", self.interval_seconds))
        })?;
        let mut schedule = SourceSchedule::new(source_name, interval);
        if let Some(payload) = self.payload {
            schedule = schedule.with_payload(payload);
        }
        if let Some(pacing) = self.pacing {
            schedule = schedule.with_pacing(pacing);
        }
        if let Some(max_retries) = self.max_retries {
            schedule = schedule.with_max_retries(max_retries);
        }
        if !self.enabled {
            schedule = schedule.disabled();
        }
        Ok(schedule)
    }
}

#[derive(Debug, Deserialize)]
pub struct RunListParams {
    pub limit: Option<i64>,
}

pub async fn list_schedules(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let schedules = state.control.list_schedules().await?;
    Ok(success(schedules))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Path(source_name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let schedule = state.control.get_schedule(&source_name).await?;
    Ok(success(schedule))
}

pub async fn upsert_schedule(
    State(state): State<AppState>,
    Path(source_name): Path<String>,
    Json(request): Json<UpsertScheduleRequest>,
) -> ApiResult<impl IntoResponse> {
    let schedule = state
        .control
        .upsert_schedule(request.into_schedule(source_name)?)
        .await?;
    info!(source_name = %schedule.source_name, "调度配置已更新");
    Ok(success(schedule))
}

pub async fn enable_schedule(
    State(state): State<AppState>,
    Path(source_name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let schedule = state.control.enable(&source_name).await?;
    Ok(success(schedule))
}

pub async fn disable_schedule(
    State(state): State<AppState>,
    Path(source_name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let schedule = state.control.disable(&source_name).await?;
    Ok(success(schedule))
}

/// 抓取源的运行历史，按创建时间倒序
pub async fn list_source_runs(
    State(state): State<AppState>,
    Path(source_name): Path<String>,
    Query(params): Query<RunListParams>,
) -> ApiResult<impl IntoResponse> {
    let runs = state
        .control
        .list_runs(&source_name, params.limit.unwrap_or(DEFAULT_RUN_LIMIT))
        .await?;
    Ok(success(runs))
}
