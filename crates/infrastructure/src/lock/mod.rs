pub mod memory;
pub mod redis_lock;

pub use self::memory::InMemoryLockCoordinator;
pub use self::redis_lock::RedisLockCoordinator;

use std::sync::Arc;

use scrape_core::config::{LockBackendType, LockConfig};
use scrape_core::traits::LockCoordinator;
use scrape_core::SchedulerResult;
use tracing::info;

pub struct LockCoordinatorFactory;

impl LockCoordinatorFactory {
    pub async fn create(config: &LockConfig) -> SchedulerResult<Arc<dyn LockCoordinator>> {
        match config.backend {
            LockBackendType::Memory => {
                info!("Initializing in-memory lock coordinator");
                Ok(Arc::new(InMemoryLockCoordinator::new()))
            }
            LockBackendType::Redis => {
                info!("Initializing Redis lock coordinator");
                let coordinator =
                    RedisLockCoordinator::connect(&config.url, &config.key_prefix).await?;
                Ok(Arc::new(coordinator))
            }
        }
    }
}
