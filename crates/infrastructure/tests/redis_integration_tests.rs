use std::time::Duration;

use anyhow::Result;
use scrape_core::models::{Message, PacingConfig, RunExecutionMessage, RunTrigger};
use scrape_core::traits::{LockCoordinator, MessageQueue};
use scrape_infrastructure::{RedisLockCoordinator, RedisMessageQueue};
use serde_json::json;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::redis::Redis;

async fn start_redis() -> Result<(ContainerAsync<Redis>, String)> {
    let container = Redis::default().start().await?;
    let port = container.get_host_port_ipv4(6379).await?;
    Ok((container, format!("redis://127.0.0.1:{port}")))
}

fn run_message(run_id: &str) -> Message {
    Message::run_execution(RunExecutionMessage {
        run_id: run_id.to_string(),
        source_name: "board".to_string(),
        trigger: RunTrigger::Manual,
        payload: json!({"pages": 2}),
        pacing: PacingConfig::none(),
        max_retries: 1,
    })
}

#[tokio::test]
#[ignore] // 需要 Docker
async fn test_redis_lock_mutual_exclusion() -> Result<()> {
    let (_container, url) = start_redis().await?;
    let locks = RedisLockCoordinator::connect(&url, "test:lock:").await?;
    let ttl = Duration::from_secs(30);

    assert!(locks.acquire("board", "run-1", ttl).await?);
    assert!(!locks.acquire("board", "run-2", ttl).await?);
    assert_eq!(locks.current_holder("board").await?.as_deref(), Some("run-1"));

    assert!(!locks.release("board", "run-2").await?);
    assert!(locks.refresh("board", "run-1", ttl).await?);
    assert!(locks.release("board", "run-1").await?);
    assert!(locks.acquire("board", "run-2", ttl).await?);
    Ok(())
}

#[tokio::test]
#[ignore] // 需要 Docker
async fn test_redis_lock_expires() -> Result<()> {
    let (_container, url) = start_redis().await?;
    let locks = RedisLockCoordinator::connect(&url, "test:lock:").await?;

    assert!(locks.acquire("board", "crashed", Duration::from_millis(200)).await?);
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(!locks.refresh("board", "crashed", Duration::from_secs(5)).await?);
    assert!(locks.acquire("board", "next", Duration::from_secs(5)).await?);
    Ok(())
}

#[tokio::test]
#[ignore] // 需要 Docker
async fn test_redis_queue_ack_and_requeue() -> Result<()> {
    let (_container, url) = start_redis().await?;
    let queue = RedisMessageQueue::connect(&url, "worker-a", Duration::from_millis(50)).await?;

    queue.publish_message("runs", &run_message("run-1")).await?;
    queue.publish_message("runs", &run_message("run-2")).await?;
    assert_eq!(queue.get_queue_size("runs").await?, 2);

    let first = queue
        .consume_message("runs", Duration::from_secs(1))
        .await?
        .expect("message expected");
    assert_eq!(first.run_id(), "run-1");
    queue.ack_message(&first.id).await?;

    let second = queue
        .consume_message("runs", Duration::from_secs(1))
        .await?
        .expect("message expected");
    queue.nack_message(&second.id, true).await?;

    let redelivered = queue
        .consume_message("runs", Duration::from_secs(1))
        .await?
        .expect("message expected");
    assert_eq!(redelivered.id, second.id);
    assert_eq!(redelivered.retry_count, 1);
    queue.ack_message(&redelivered.id).await?;

    assert!(queue
        .consume_message("runs", Duration::from_millis(100))
        .await?
        .is_none());
    Ok(())
}

#[tokio::test]
#[ignore] // 需要 Docker
async fn test_redis_queue_recovers_after_consumer_crash() -> Result<()> {
    let (_container, url) = start_redis().await?;

    {
        let crashed = RedisMessageQueue::connect(&url, "worker-a", Duration::from_millis(50)).await?;
        crashed.publish_message("runs", &run_message("run-1")).await?;
        let taken = crashed.consume_message("runs", Duration::from_secs(1)).await?;
        assert!(taken.is_some());
        // 不确认直接丢弃，模拟进程崩溃
    }

    let restarted = RedisMessageQueue::connect(&url, "worker-a", Duration::from_millis(50)).await?;
    assert_eq!(restarted.get_queue_size("runs").await?, 0);
    assert_eq!(restarted.recover_in_flight("runs").await?, 1);

    let message = restarted
        .consume_message("runs", Duration::from_secs(1))
        .await?
        .expect("message expected");
    assert_eq!(message.run_id(), "run-1");
    Ok(())
}
