pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::*;
pub use errors::*;
pub use models::{
    Message, MessageType, PacingConfig, PersistOutcome, RawRecord, RejectedRecord, Run,
    RunExecutionMessage, RunProgress, RunStatus, RunTrigger, ScrapedEntity, SourceSchedule,
};
pub use traits::{
    EnqueueRunRequest, EntityRepository, ExtractionRequest, Extractor, LockCoordinator,
    MessageQueue, RunControlService, RunRepository, SourceScheduleRepository,
};

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
