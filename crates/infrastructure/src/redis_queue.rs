use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use scrape_core::models::Message;
use scrape_core::traits::MessageQueue;
use scrape_core::{SchedulerError, SchedulerResult};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

fn queue_error(action: &str, err: redis::RedisError) -> SchedulerError {
    SchedulerError::MessageQueue(format!("Redis {action} failed: {err}"))
}

/// 基于 Redis 列表的可靠队列
///
/// 生产者 `LPUSH` 到 `{queue}`；消费者用 `LMOVE` 把消息原子地移到
/// 自己的处理中列表 `{queue}:processing:{consumer_id}`，确认时再删除。
/// 进程崩溃后，同一个 `consumer_id` 重启时通过 `recover_in_flight`
/// 把遗留消息放回队列，保证至少一次投递。
///
/// 不使用阻塞命令，共享连接上按 `poll_interval` 轮询。
pub struct RedisMessageQueue {
    conn: ConnectionManager,
    consumer_id: String,
    poll_interval: Duration,
    /// 消息ID -> (队列名, 原始负载)，确认时按原始负载 `LREM`
    in_flight: Mutex<HashMap<String, (String, String)>>,
}

impl RedisMessageQueue {
    pub async fn connect(
        url: &str,
        consumer_id: &str,
        poll_interval: Duration,
    ) -> SchedulerResult<Self> {
        let client = Client::open(url).map_err(|e| queue_error("client", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| queue_error("connect", e))?;
        info!("Connected Redis message queue at {} as {}", url, consumer_id);

        Ok(Self {
            conn,
            consumer_id: consumer_id.to_string(),
            poll_interval,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    fn processing_key(&self, queue: &str) -> String {
        format!("{queue}:processing:{}", self.consumer_id)
    }

    async fn try_move(&self, queue: &str) -> SchedulerResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("LMOVE")
            .arg(queue)
            .arg(self.processing_key(queue))
            .arg("RIGHT")
            .arg("LEFT")
            .query_async(&mut conn)
            .await
            .map_err(|e| queue_error("LMOVE", e))
    }

    async fn remove_processing(&self, queue: &str, raw: &str) -> SchedulerResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LREM")
            .arg(self.processing_key(queue))
            .arg(1)
            .arg(raw)
            .query_async(&mut conn)
            .await
            .map_err(|e| queue_error("LREM", e))?;
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for RedisMessageQueue {
    async fn publish_message(&self, queue: &str, message: &Message) -> SchedulerResult<()> {
        let payload = message.serialize()?;
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(queue)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| queue_error("LPUSH", e))?;
        debug!("Published message {} to queue {}", message.id, queue);
        Ok(())
    }

    async fn consume_message(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> SchedulerResult<Option<Message>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(raw) = self.try_move(queue).await? {
                match Message::deserialize(&raw) {
                    Ok(message) => {
                        self.in_flight
                            .lock()
                            .await
                            .insert(message.id.clone(), (queue.to_string(), raw));
                        return Ok(Some(message));
                    }
                    Err(e) => {
                        // 无法解析的消息直接丢弃，避免反复投递
                        error!("Dropping malformed message from {}: {}", queue, e);
                        self.remove_processing(queue, &raw).await?;
                        continue;
                    }
                }
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn ack_message(&self, message_id: &str) -> SchedulerResult<()> {
        let entry = self.in_flight.lock().await.remove(message_id);
        match entry {
            Some((queue, raw)) => self.remove_processing(&queue, &raw).await,
            None => {
                warn!("Ack for unknown message {}", message_id);
                Ok(())
            }
        }
    }

    async fn nack_message(&self, message_id: &str, requeue: bool) -> SchedulerResult<()> {
        let entry = self.in_flight.lock().await.remove(message_id);
        let Some((queue, raw)) = entry else {
            warn!("Nack for unknown message {}", message_id);
            return Ok(());
        };

        if !requeue {
            return self.remove_processing(&queue, &raw).await;
        }

        let mut message = Message::deserialize(&raw)?;
        message.increment_retry();
        let payload = message.serialize()?;

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(self.processing_key(&queue))
            .arg(1)
            .arg(&raw)
            .ignore()
            .cmd("RPUSH")
            .arg(&queue)
            .arg(payload)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| queue_error("requeue", e))?;
        Ok(())
    }

    async fn get_queue_size(&self, queue: &str) -> SchedulerResult<u32> {
        let mut conn = self.conn.clone();
        redis::cmd("LLEN")
            .arg(queue)
            .query_async(&mut conn)
            .await
            .map_err(|e| queue_error("LLEN", e))
    }

    async fn purge_queue(&self, queue: &str) -> SchedulerResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(queue)
            .query_async(&mut conn)
            .await
            .map_err(|e| queue_error("DEL", e))?;
        Ok(())
    }

    async fn recover_in_flight(&self, queue: &str) -> SchedulerResult<u32> {
        let processing = self.processing_key(queue);
        let mut recovered = 0;
        loop {
            let mut conn = self.conn.clone();
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(&processing)
                .arg(queue)
                .arg("RIGHT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await
                .map_err(|e| queue_error("LMOVE", e))?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            info!("Recovered {} in-flight messages to {}", recovered, queue);
        }
        Ok(recovered)
    }
}
