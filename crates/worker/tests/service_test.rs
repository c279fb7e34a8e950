use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;

use scrape_core::models::{Message, PacingConfig, RawRecord, Run, RunExecutionMessage, RunStatus, RunTrigger};
use scrape_core::traits::{ExtractionRequest, Extractor, MessageQueue, RunRepository};
use scrape_core::ExtractionError;
use scrape_infrastructure::{
    DatabaseManager, InMemoryLockCoordinator, InMemoryMessageQueue, MetricsCollector,
};
use scrape_worker::{ExecutorSettings, ExtractorRegistry, RunExecutor, WorkerService};

const RUN_QUEUE: &str = "scrape_runs";

struct SlowPages;

#[async_trait]
impl Extractor for SlowPages {
    async fn extract_unit(
        &self,
        request: ExtractionRequest<'_>,
    ) -> Result<Vec<RawRecord>, ExtractionError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(vec![RawRecord::new(
            format!("https://{}.example.com/{}", request.source_name, request.unit),
            json!({"unit": request.unit}),
        )])
    }
}

async fn wait_until_terminal(runs: &Arc<dyn RunRepository>, run_ids: &[String]) {
    for _ in 0..200 {
        let mut done = true;
        for run_id in run_ids {
            let run = runs.get_by_id(run_id).await.unwrap().unwrap();
            done &= run.is_terminal();
        }
        if done {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("runs did not finish in time");
}

#[tokio::test]
async fn test_worker_drains_queue_and_acks() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let runs = db.run_repository();
    let queue = Arc::new(InMemoryMessageQueue::new());

    let executor = Arc::new(RunExecutor::new(
        "worker-1",
        runs.clone(),
        db.entity_repository(),
        Arc::new(InMemoryLockCoordinator::new()),
        Arc::new(ExtractorRegistry::new().with_fallback(Arc::new(SlowPages))),
        ExecutorSettings {
            retry_backoff: Duration::ZERO,
            ..ExecutorSettings::default()
        },
        MetricsCollector::new(),
    ));

    let mut run_ids = Vec::new();
    for source in ["alpha", "beta", "gamma"] {
        let run = Run::new(
            Run::generate_id(),
            source,
            None,
            RunTrigger::Manual,
            json!({"pages": 2}),
        );
        runs.create(&run).await.unwrap();
        let message =
            Message::run_execution(RunExecutionMessage::for_run(&run, PacingConfig::none(), 0));
        queue.publish_message(RUN_QUEUE, &message).await.unwrap();
        run_ids.push(run.run_id);
    }

    let service = Arc::new(
        WorkerService::builder(
            "worker-1".to_string(),
            queue.clone(),
            executor,
            RUN_QUEUE.to_string(),
        )
        .concurrency(2)
        .poll_timeout(Duration::from_millis(50))
        .build(),
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = {
        let service = service.clone();
        tokio::spawn(async move { service.run(shutdown_rx).await })
    };

    wait_until_terminal(&runs, &run_ids).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    for run_id in &run_ids {
        let run = runs.get_by_id(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.completed_units, 2);
    }
    assert_eq!(queue.get_queue_size(RUN_QUEUE).await.unwrap(), 0);
    assert_eq!(queue.in_flight_count().await, 0);
    assert_eq!(service.active_runs(), 0);
}

#[tokio::test]
async fn test_worker_acks_stale_messages() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let runs = db.run_repository();
    let queue = Arc::new(InMemoryMessageQueue::new());

    let executor = Arc::new(RunExecutor::new(
        "worker-1",
        runs.clone(),
        db.entity_repository(),
        Arc::new(InMemoryLockCoordinator::new()),
        Arc::new(ExtractorRegistry::new().with_fallback(Arc::new(SlowPages))),
        ExecutorSettings::default(),
        MetricsCollector::new(),
    ));

    // 指向不存在的运行，执行器跳过后消息仍被确认
    let orphan = Run::new("run-orphan", "alpha", None, RunTrigger::Manual, json!({}));
    let message =
        Message::run_execution(RunExecutionMessage::for_run(&orphan, PacingConfig::none(), 0));
    queue.publish_message(RUN_QUEUE, &message).await.unwrap();

    let service = WorkerService::builder(
        "worker-1".to_string(),
        queue.clone(),
        executor,
        RUN_QUEUE.to_string(),
    )
    .poll_timeout(Duration::from_millis(20))
    .build();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.send(()).unwrap();
    });

    service.run(shutdown_rx).await.unwrap();
    stopper.await.unwrap();

    assert_eq!(queue.get_queue_size(RUN_QUEUE).await.unwrap(), 0);
    assert_eq!(queue.in_flight_count().await, 0);
}
