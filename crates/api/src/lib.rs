//! # Scrape API
//!
//! 抓取调度的 HTTP 控制面：手动触发运行、查询运行状态、管理调度配置。
//!
//! 所有处理器只依赖 [`RunControlService`]，不直接访问存储或队列。
//!
//! ## API 端点
//!
//! - `GET /health` - 健康检查
//! - `GET /api/schedules` - 调度配置列表
//! - `GET|PUT /api/schedules/{source_name}` - 查询或写入调度配置
//! - `POST /api/schedules/{source_name}/enable` / `disable` - 启用或停用定时调度
//! - `GET /api/schedules/{source_name}/runs?limit=` - 运行历史
//! - `POST /api/sources/{source_name}/runs` - 手动触发，返回 `202 {run_id}`
//! - `GET /api/runs/{run_id}` - 运行状态
//!
//! ```bash
//! curl -X POST http://localhost:8080/api/sources/job-board/runs \
//!   -H "Content-Type: application/json" \
//!   -d '{"payload_overrides": {"pages": 3}}'
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, trace_layer};
use routes::{create_routes, AppState};
use scrape_core::traits::RunControlService;

pub use error::{ApiError, ApiResult};

/// 创建完整的API应用
pub fn create_app(control: Arc<dyn RunControlService>) -> Router {
    create_routes(AppState { control }).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
