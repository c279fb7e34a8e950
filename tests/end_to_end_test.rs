use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::broadcast;

use scrape_core::config::AppConfig;
use scrape_core::models::{RawRecord, Run, RunStatus, RunTrigger};
use scrape_core::traits::{
    EnqueueRunRequest, ExtractionRequest, Extractor, MessageQueue, RunControlService,
};
use scrape_core::ExtractionError;
use scrape_scheduler::{AppMode, Application, ShutdownManager};
use scrape_worker::ExtractorRegistry;

/// 每页返回固定的三条职位，页码决定 URL
struct FakeBoard {
    delay: Duration,
}

#[async_trait]
impl Extractor for FakeBoard {
    async fn extract_unit(
        &self,
        request: ExtractionRequest<'_>,
    ) -> Result<Vec<RawRecord>, ExtractionError> {
        tokio::time::sleep(self.delay).await;
        Ok((0..3)
            .map(|i| {
                RawRecord::new(
                    format!("https://Board.example.com/jobs/{}-{}#apply", request.unit, i),
                    json!({"title": format!("Engineer {i}"), "page": request.unit}),
                )
            })
            .collect())
    }
}

fn config(dir: &TempDir) -> AppConfig {
    let db_path = dir.path().join("scrape.db");
    AppConfig::from_toml(&format!(
        r#"
[database]
url = "sqlite:{}?mode=rwc"

[message_queue]
poll_interval_ms = 20

[worker]
concurrency = 2
default_pacing = {{ min_delay_ms = 0, max_delay_ms = 0 }}

[api]
bind_address = "127.0.0.1:0"

[[sources]]
source_name = "job-board"
interval_seconds = 3600
payload = {{ pages = 2 }}
pacing = {{ min_delay_ms = 0, max_delay_ms = 0 }}
max_retries = 1
"#,
        db_path.display()
    ))
    .unwrap()
}

async fn application(dir: &TempDir, delay: Duration) -> Application {
    Application::new(config(dir), AppMode::All)
        .await
        .unwrap()
        .with_extractors(ExtractorRegistry::new().register("job-board", Arc::new(FakeBoard { delay })))
}

async fn wait_for_terminal(app: &Application, run_ids: &[String]) -> Vec<Run> {
    let runs = app.database().run_repository();
    for _ in 0..200 {
        let mut finished = Vec::new();
        for run_id in run_ids {
            let run = runs.get_by_id(run_id).await.unwrap().unwrap();
            if run.is_terminal() {
                finished.push(run);
            }
        }
        if finished.len() == run_ids.len() {
            return finished;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("runs did not finish in time");
}

/// 启动 Worker 池，返回关闭函数
fn spawn_worker(app: &Application) -> (broadcast::Sender<()>, tokio::task::JoinHandle<()>) {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = app.worker();
    let handle = tokio::spawn(async move {
        worker.run(shutdown_rx).await.unwrap();
    });
    (shutdown_tx, handle)
}

#[tokio::test]
async fn test_scheduled_run_flows_to_persistence() {
    let dir = TempDir::new().unwrap();
    let app = application(&dir, Duration::ZERO).await;
    assert_eq!(app.seed_sources().await.unwrap(), 1);

    let scheduler = app.scheduler();
    let report = scheduler.tick().await.unwrap();
    assert_eq!(report.scheduled.len(), 1);

    // 同一时刻再次扫描不会重复调度
    let report = scheduler.tick().await.unwrap();
    assert!(report.scheduled.is_empty());

    let (shutdown_tx, handle) = spawn_worker(&app);
    let runs = wait_for_terminal(&app, &[report_run_id(&app).await]).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    let run = &runs[0];
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.trigger, RunTrigger::Schedule);
    assert_eq!(run.completed_units, 2);

    let entities = app.database().entity_repository();
    assert_eq!(entities.count_entities("job-board").await.unwrap(), 6);
    let entity = entities
        .get_entity("job-board", "https://board.example.com/jobs/0-0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity.run_id.as_deref(), Some(run.run_id.as_str()));

    let schedule = app.controller().get_schedule("job-board").await.unwrap();
    assert!(schedule.last_run_at.is_some());
    assert!(schedule.next_run_at > chrono::Utc::now() + chrono::Duration::minutes(50));
}

async fn report_run_id(app: &Application) -> String {
    let runs = app.controller().list_runs("job-board", 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    runs[0].run_id.clone()
}

#[tokio::test]
async fn test_repeated_runs_do_not_duplicate_entities() {
    let dir = TempDir::new().unwrap();
    let app = application(&dir, Duration::ZERO).await;
    app.seed_sources().await.unwrap();
    let controller = app.controller();

    let (shutdown_tx, handle) = spawn_worker(&app);

    let first = controller
        .enqueue_run("job-board", EnqueueRunRequest::default())
        .await
        .unwrap();
    wait_for_terminal(&app, &[first]).await;

    let second = controller
        .enqueue_run("job-board", EnqueueRunRequest::default())
        .await
        .unwrap();
    let runs = wait_for_terminal(&app, &[second]).await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    let run = &runs[0];
    assert_eq!(run.status, RunStatus::Succeeded);
    let summary = run.message.clone().unwrap();
    assert!(summary.contains("inserted=0"), "{summary}");
    assert!(summary.contains("skipped_duplicates=6"), "{summary}");
    assert_eq!(
        app.database()
            .entity_repository()
            .count_entities("job-board")
            .await
            .unwrap(),
        6
    );
}

#[tokio::test]
async fn test_overlapping_runs_for_one_source() {
    let dir = TempDir::new().unwrap();
    let app = application(&dir, Duration::from_millis(100)).await;
    app.seed_sources().await.unwrap();
    let controller = app.controller();

    let first = controller
        .enqueue_run("job-board", EnqueueRunRequest::default())
        .await
        .unwrap();
    let second = controller
        .enqueue_run("job-board", EnqueueRunRequest::default())
        .await
        .unwrap();
    assert_eq!(app.message_queue().get_queue_size("scrape_runs").await.unwrap(), 2);

    let (shutdown_tx, handle) = spawn_worker(&app);
    let runs = wait_for_terminal(&app, &[first, second]).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    let succeeded = runs.iter().filter(|run| run.status == RunStatus::Succeeded).count();
    let busy = runs.iter().filter(|run| run.is_source_busy()).count();
    assert_eq!(succeeded, 1);
    assert_eq!(busy, 1);
}

#[tokio::test]
async fn test_seeding_preserves_schedule_state() {
    let dir = TempDir::new().unwrap();
    let app = application(&dir, Duration::ZERO).await;
    app.seed_sources().await.unwrap();
    app.scheduler().tick().await.unwrap();

    let controller = app.controller();
    let before = controller.get_schedule("job-board").await.unwrap();

    app.seed_sources().await.unwrap();
    let after = controller.get_schedule("job-board").await.unwrap();
    assert_eq!(after.next_run_at, before.next_run_at);
    assert_eq!(after.last_run_at, before.last_run_at);
}

#[tokio::test]
async fn test_application_shuts_down_gracefully() {
    let dir = TempDir::new().unwrap();
    let app = Arc::new(application(&dir, Duration::ZERO).await);
    let shutdown = ShutdownManager::new();

    let handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown.subscribe().await;
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.shutdown().await;

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
