use std::time::Duration;

use async_trait::async_trait;

use crate::{models::Message, SchedulerResult};

/// 消息队列抽象接口
///
/// 至少一次投递：消息被 `consume_message` 取出后进入处理中状态，
/// 直到 `ack_message` 才真正移除；`nack_message(requeue = true)` 放回队列。
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// 发布消息到指定队列
    async fn publish_message(&self, queue: &str, message: &Message) -> SchedulerResult<()>;

    /// 从指定队列取出一条消息，超时返回 `None`
    async fn consume_message(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> SchedulerResult<Option<Message>>;

    /// 确认消息处理完成
    async fn ack_message(&self, message_id: &str) -> SchedulerResult<()>;

    /// 拒绝消息，可选重新入队
    async fn nack_message(&self, message_id: &str, requeue: bool) -> SchedulerResult<()>;

    /// 获取队列中待消费的消息数量
    async fn get_queue_size(&self, queue: &str) -> SchedulerResult<u32>;

    /// 清空队列
    async fn purge_queue(&self, queue: &str) -> SchedulerResult<()>;

    /// 把上次进程退出时遗留在处理中的消息放回队列，返回恢复的条数
    async fn recover_in_flight(&self, _queue: &str) -> SchedulerResult<u32> {
        Ok(0)
    }
}
