pub mod api_observability;
pub mod app_config;
pub mod database;
pub mod dispatcher_worker;
pub mod lock;
pub mod message_queue;
pub mod sources;

// Re-export main types for easier imports
pub use api_observability::{ApiConfig, LogFormat, ObservabilityConfig};
pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use dispatcher_worker::{DispatcherConfig, WorkerConfig};
pub use lock::{LockBackendType, LockConfig};
pub use message_queue::{MessageQueueConfig, MessageQueueType};
pub use sources::SourceSeedConfig;
