use std::sync::Arc;

use scrape_core::config::{MessageQueueConfig, MessageQueueType};
use scrape_core::traits::MessageQueue;
use scrape_core::SchedulerResult;
use tracing::{debug, info};

use crate::{InMemoryMessageQueue, RedisMessageQueue};

pub struct MessageQueueFactory;

impl MessageQueueFactory {
    /// 根据配置创建队列，`consumer_id` 用于 Redis 处理中列表的命名
    pub async fn create(
        config: &MessageQueueConfig,
        consumer_id: &str,
    ) -> SchedulerResult<Arc<dyn MessageQueue>> {
        debug!("Creating message queue with backend: {:?}", config.backend);

        match config.backend {
            MessageQueueType::Memory => {
                info!("Initializing in-memory message queue");
                Ok(Arc::new(InMemoryMessageQueue::new()))
            }
            MessageQueueType::Redis => {
                info!("Initializing Redis message queue");
                let queue =
                    RedisMessageQueue::connect(&config.url, consumer_id, config.poll_interval())
                        .await?;
                Ok(Arc::new(queue))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend() {
        let config = MessageQueueConfig::default();
        let queue = MessageQueueFactory::create(&config, "worker-001").await.unwrap();
        assert_eq!(queue.get_queue_size(&config.run_queue).await.unwrap(), 0);
    }
}
