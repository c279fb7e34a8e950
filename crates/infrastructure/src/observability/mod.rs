//! 可观测性模块
//!
//! - 指标收集（Prometheus 导出）
//! - 结构化日志事件
//! - 日志与指标的初始化

pub mod metrics_collector;
pub mod structured_logger;
pub mod telemetry_setup;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
pub use telemetry_setup::{init_metrics, init_structured_logging, LoggingConfig};
