//! # 数据模型
//!
//! 定义定时抓取队列的核心数据结构：抓取源调度配置、运行实例、抓取实体与队列消息。
//!
//! ## 核心模型
//!
//! ### SourceSchedule - 抓取源调度配置
//! 一个周期性抓取源的配置。`next_run_at` 是调度器判断是否到期的唯一字段，
//! 也是唯一可变的调度状态；“是否正在运行”由锁协调器负责，不记录在这里。
//!
//! ### Run - 运行实例
//! 一次执行尝试的审计记录与状态机，由生产者以 `queued` 创建，
//! 之后只由持有它的执行器修改，`finished_at` 设置后不可再变。
//!
//! ### ScrapedEntity - 抓取实体
//! 外部观测到的一条记录，以 (`source_name`, `item_url`) 作为自然键去重。
//!
//! ### Message - 队列消息
//! 生产者（调度器、手动触发）与执行器之间传递的运行请求。
//!
//! ## 状态管理
//!
//! ```text
//! queued → running → succeeded
//!    ↓        ↓  ↘
//!  failed   failed  partial
//! ```
//!
//! ## 数据库映射
//!
//! - `source_schedules` - 主键 `source_name`
//! - `runs` - 主键 `run_id`，`source_ref` 可空外键
//! - `scraped_entities` - 唯一约束 (`source_name`, `item_url`)

pub mod entity;
pub mod message;
pub mod run;
pub mod schedule;

pub use entity::*;
pub use message::*;
pub use run::*;
pub use schedule::*;
