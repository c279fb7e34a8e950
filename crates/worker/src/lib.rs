pub mod executor;
pub mod extractors;
pub mod heartbeat;
pub mod pacing;
pub mod service;

pub use executor::{ExecutionOutcome, ExecutorSettings, RunExecutor};
pub use extractors::{ExtractorRegistry, HttpJsonExtractor, HttpJsonParams};
pub use heartbeat::LockHeartbeat;
pub use pacing::Pacer;
pub use service::{WorkerService, WorkerServiceBuilder};
