use axum::{
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;

use scrape_core::traits::EnqueueRunRequest;

use crate::{
    error::{ApiError, ApiResult},
    response::{accepted, success},
    routes::AppState,
};

#[derive(Debug, Serialize)]
pub struct EnqueuedRun {
    pub run_id: String,
}

/// 手动触发运行
///
/// 请求体可以为空；非空时按 `EnqueueRunRequest` 解析。
pub async fn enqueue_run(
    State(state): State<AppState>,
    Path(source_name): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        EnqueueRunRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    let run_id = state.control.enqueue_run(&source_name, request).await?;
    Ok(accepted(EnqueuedRun { run_id }))
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let run = state.control.get_run_status(&run_id).await?;
    Ok(success(run))
}
