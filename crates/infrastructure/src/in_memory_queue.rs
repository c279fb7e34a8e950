use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use scrape_core::models::Message;
use scrape_core::traits::MessageQueue;
use scrape_core::SchedulerResult;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct QueueState {
    /// 队列名 -> 待消费消息
    queues: HashMap<String, VecDeque<Message>>,
    /// 消息ID -> (队列名, 消息)，等待确认
    in_flight: HashMap<String, (String, Message)>,
}

/// 内存消息队列实现
///
/// 适用于单进程部署：调度器、执行器与 API 共享同一个实例。
/// 消费出的消息在确认前保存在处理中集合，`nack` 可以放回队列。
#[derive(Debug, Default)]
pub struct InMemoryMessageQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn in_flight_count(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish_message(&self, queue: &str, message: &Message) -> SchedulerResult<()> {
        {
            let mut state = self.state.lock().await;
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .push_back(message.clone());
        }
        debug!("Published message {} to queue {}", message.id, queue);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn consume_message(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> SchedulerResult<Option<Message>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // 先登记等待再检查队列，避免错过检查与等待之间的发布通知
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                let next = state.queues.get_mut(queue).and_then(VecDeque::pop_front);
                if let Some(message) = next {
                    state
                        .in_flight
                        .insert(message.id.clone(), (queue.to_string(), message.clone()));
                    return Ok(Some(message));
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn ack_message(&self, message_id: &str) -> SchedulerResult<()> {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(message_id).is_none() {
            warn!("Ack for unknown message {}", message_id);
        }
        Ok(())
    }

    async fn nack_message(&self, message_id: &str, requeue: bool) -> SchedulerResult<()> {
        let requeued = {
            let mut state = self.state.lock().await;
            match state.in_flight.remove(message_id) {
                Some((queue, mut message)) if requeue => {
                    message.increment_retry();
                    state.queues.entry(queue).or_default().push_back(message);
                    true
                }
                Some(_) => false,
                None => {
                    warn!("Nack for unknown message {}", message_id);
                    false
                }
            }
        };

        if requeued {
            self.notify.notify_waiters();
        }
        Ok(())
    }

    async fn get_queue_size(&self, queue: &str) -> SchedulerResult<u32> {
        let state = self.state.lock().await;
        Ok(state.queues.get(queue).map_or(0, |q| q.len() as u32))
    }

    async fn purge_queue(&self, queue: &str) -> SchedulerResult<()> {
        let mut state = self.state.lock().await;
        if let Some(q) = state.queues.get_mut(queue) {
            q.clear();
        }
        Ok(())
    }

    async fn recover_in_flight(&self, queue: &str) -> SchedulerResult<u32> {
        let recovered = {
            let mut state = self.state.lock().await;
            let ids: Vec<String> = state
                .in_flight
                .iter()
                .filter(|(_, (q, _))| q == queue)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &ids {
                if let Some((q, message)) = state.in_flight.remove(id) {
                    state.queues.entry(q).or_default().push_front(message);
                }
            }
            ids.len() as u32
        };

        if recovered > 0 {
            self.notify.notify_waiters();
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrape_core::models::{PacingConfig, RunExecutionMessage, RunTrigger};
    use serde_json::json;
    use std::sync::Arc;

    fn run_message(run_id: &str) -> Message {
        Message::run_execution(RunExecutionMessage {
            run_id: run_id.to_string(),
            source_name: "board".to_string(),
            trigger: RunTrigger::Schedule,
            payload: json!({}),
            pacing: PacingConfig::none(),
            max_retries: 0,
        })
    }

    #[tokio::test]
    async fn test_fifo_and_ack() {
        let queue = InMemoryMessageQueue::new();
        queue.publish_message("runs", &run_message("a")).await.unwrap();
        queue.publish_message("runs", &run_message("b")).await.unwrap();
        assert_eq!(queue.get_queue_size("runs").await.unwrap(), 2);

        let first = queue
            .consume_message("runs", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.run_id(), "a");
        assert_eq!(queue.in_flight_count().await, 1);

        queue.ack_message(&first.id).await.unwrap();
        assert_eq!(queue.in_flight_count().await, 0);
        assert_eq!(queue.get_queue_size("runs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_consume_times_out_on_empty_queue() {
        let queue = InMemoryMessageQueue::new();
        let result = queue
            .consume_message("runs", Duration::from_millis(20))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_waiting_consumer_is_woken_by_publish() {
        let queue = Arc::new(InMemoryMessageQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .consume_message("runs", Duration::from_secs(5))
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.publish_message("runs", &run_message("late")).await.unwrap();

        let message = consumer.await.unwrap().unwrap();
        assert_eq!(message.run_id(), "late");
    }

    #[tokio::test]
    async fn test_nack_requeues_with_retry_count() {
        let queue = InMemoryMessageQueue::new();
        queue.publish_message("runs", &run_message("a")).await.unwrap();

        let message = queue
            .consume_message("runs", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        queue.nack_message(&message.id, true).await.unwrap();

        let again = queue
            .consume_message("runs", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.id, message.id);
        assert_eq!(again.retry_count, 1);

        queue.nack_message(&again.id, false).await.unwrap();
        assert_eq!(queue.get_queue_size("runs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recover_in_flight() {
        let queue = InMemoryMessageQueue::new();
        queue.publish_message("runs", &run_message("a")).await.unwrap();
        queue
            .consume_message("runs", Duration::from_millis(10))
            .await
            .unwrap();

        assert_eq!(queue.recover_in_flight("runs").await.unwrap(), 1);
        assert_eq!(queue.get_queue_size("runs").await.unwrap(), 1);
        assert_eq!(queue.in_flight_count().await, 0);
    }
}
