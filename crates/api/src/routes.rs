use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use scrape_core::traits::RunControlService;

use crate::handlers::{
    health::health_check,
    runs::{enqueue_run, get_run},
    schedules::{
        disable_schedule, enable_schedule, get_schedule, list_schedules, list_source_runs,
        upsert_schedule,
    },
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub control: Arc<dyn RunControlService>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // 调度配置
        .route("/api/schedules", get(list_schedules))
        .route(
            "/api/schedules/{source_name}",
            get(get_schedule).put(upsert_schedule),
        )
        .route("/api/schedules/{source_name}/enable", post(enable_schedule))
        .route("/api/schedules/{source_name}/disable", post(disable_schedule))
        .route("/api/schedules/{source_name}/runs", get(list_source_runs))
        // 运行
        .route("/api/sources/{source_name}/runs", post(enqueue_run))
        .route("/api/runs/{run_id}", get(get_run))
        .with_state(state)
}
