//! 调度端组件
//!
//! - `scheduler` - 周期扫描到期的抓取源并入队
//! - `controller` - 手动触发、运行状态查询与调度配置管理
//! - `jitter` - 下次运行时间的随机抖动

pub mod controller;
pub mod jitter;
pub mod scheduler;

pub use controller::{merge_payload, RunController};
pub use jitter::compute_next_run_at;
pub use scheduler::{ScheduleOutcome, SourceScheduler, TickReport};
