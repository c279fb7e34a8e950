pub mod database;
pub mod in_memory_queue;
pub mod lock;
pub mod message_queue_factory;
pub mod observability;
pub mod redis_queue;
pub mod validation;

pub use database::*;
pub use in_memory_queue::InMemoryMessageQueue;
pub use lock::{InMemoryLockCoordinator, LockCoordinatorFactory, RedisLockCoordinator};
pub use message_queue_factory::MessageQueueFactory;
pub use observability::*;
pub use redis_queue::RedisMessageQueue;
