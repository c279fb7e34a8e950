use std::sync::Arc;
use std::time::Duration;

use scrape_core::{Message, MessageQueue, MessageType, SchedulerResult};
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};

use crate::executor::{ExecutionOutcome, RunExecutor};

/// 执行出错时消息最多重新投递的次数
const MAX_REDELIVERIES: i32 = 3;

/// Worker服务构建器
pub struct WorkerServiceBuilder {
    worker_id: String,
    message_queue: Arc<dyn MessageQueue>,
    executor: Arc<RunExecutor>,
    run_queue: String,
    concurrency: usize,
    poll_timeout: Duration,
    hostname: String,
}

impl WorkerServiceBuilder {
    pub fn new(
        worker_id: String,
        message_queue: Arc<dyn MessageQueue>,
        executor: Arc<RunExecutor>,
        run_queue: String,
    ) -> Self {
        Self {
            worker_id,
            message_queue,
            executor,
            run_queue,
            concurrency: 2,
            poll_timeout: Duration::from_secs(1),
            hostname: hostname::get()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
        }
    }

    /// 同时执行的运行数量
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// 单次消费等待时间，决定关闭信号的响应速度
    pub fn poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn build(self) -> WorkerService {
        WorkerService {
            worker_id: self.worker_id,
            message_queue: self.message_queue,
            executor: self.executor,
            run_queue: self.run_queue,
            concurrency: self.concurrency,
            poll_timeout: self.poll_timeout,
            hostname: self.hostname,
            permits: Arc::new(Semaphore::new(self.concurrency)),
        }
    }
}

/// 执行器池
///
/// 从运行队列消费消息，最多并发执行 `concurrency` 个运行。
/// 执行成功（包括跳过与失败的运行）后确认消息；基础设施错误时重新入队。
pub struct WorkerService {
    worker_id: String,
    message_queue: Arc<dyn MessageQueue>,
    executor: Arc<RunExecutor>,
    run_queue: String,
    concurrency: usize,
    poll_timeout: Duration,
    hostname: String,
    permits: Arc<Semaphore>,
}

impl WorkerService {
    pub fn builder(
        worker_id: String,
        message_queue: Arc<dyn MessageQueue>,
        executor: Arc<RunExecutor>,
        run_queue: String,
    ) -> WorkerServiceBuilder {
        WorkerServiceBuilder::new(worker_id, message_queue, executor, run_queue)
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// 当前正在执行的运行数量
    pub fn active_runs(&self) -> usize {
        self.concurrency - self.permits.available_permits()
    }

    /// 消费循环，收到关闭信号后等待进行中的运行结束
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> SchedulerResult<()> {
        let recovered = self.message_queue.recover_in_flight(&self.run_queue).await?;
        info!(
            worker_id = %self.worker_id,
            hostname = %self.hostname,
            concurrency = self.concurrency,
            recovered,
            "Worker已启动"
        );

        loop {
            let permit = tokio::select! {
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown_rx.recv() => break,
            };

            let consumed = tokio::select! {
                consumed = self.message_queue.consume_message(&self.run_queue, self.poll_timeout) => consumed,
                _ = shutdown_rx.recv() => break,
            };

            match consumed {
                Ok(Some(message)) => {
                    let queue = self.message_queue.clone();
                    let executor = self.executor.clone();
                    tokio::spawn(async move {
                        Self::handle_message(queue, executor, message).await;
                        drop(permit);
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    error!(worker_id = %self.worker_id, "消费运行队列失败: {}", e);
                    tokio::time::sleep(self.poll_timeout).await;
                }
            }
        }

        info!(worker_id = %self.worker_id, active = self.active_runs(), "Worker正在停止，等待进行中的运行");
        let _ = self.permits.acquire_many(self.concurrency as u32).await;
        info!(worker_id = %self.worker_id, "Worker已停止");
        Ok(())
    }

    async fn handle_message(
        queue: Arc<dyn MessageQueue>,
        executor: Arc<RunExecutor>,
        message: Message,
    ) {
        let MessageType::RunExecution(execution) = &message.message_type;

        match executor.execute(execution).await {
            Ok(outcome) => {
                match &outcome {
                    ExecutionOutcome::Skipped { reason } => {
                        debug!(run_id = %execution.run_id, "跳过运行: {}", reason)
                    }
                    ExecutionOutcome::Finished { status, .. } => {
                        debug!(run_id = %execution.run_id, status = %status, "运行结束")
                    }
                }
                if let Err(e) = queue.ack_message(&message.id).await {
                    warn!(message_id = %message.id, "确认消息失败: {}", e);
                }
            }
            Err(e) => {
                let requeue = message.retry_count < MAX_REDELIVERIES;
                error!(
                    run_id = %execution.run_id,
                    retry_count = message.retry_count,
                    requeue,
                    "执行运行失败: {}",
                    e
                );
                if let Err(e) = queue.nack_message(&message.id, requeue).await {
                    warn!(message_id = %message.id, "拒绝消息失败: {}", e);
                }
            }
        }
    }
}
