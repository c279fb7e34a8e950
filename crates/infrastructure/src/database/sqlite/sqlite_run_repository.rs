use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scrape_core::{
    models::{Run, RunProgress, RunStatus},
    traits::RunRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use crate::database::mapping::MappingHelpers;

const RUN_COLUMNS: &str = "run_id, source_name, source_ref, trigger_type, status, payload, \
     requested_units, completed_units, errors_count, message, created_at, started_at, finished_at";

/// 插入运行记录，供仓储与调度事务共用
pub(crate) async fn insert_run<'e, E>(executor: E, run: &Run) -> SchedulerResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO runs (run_id, source_name, source_ref, trigger_type, status, payload,
                          requested_units, completed_units, errors_count, message,
                          created_at, started_at, finished_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&run.run_id)
    .bind(&run.source_name)
    .bind(&run.source_ref)
    .bind(run.trigger)
    .bind(run.status)
    .bind(MappingHelpers::to_json_text(&run.payload)?)
    .bind(run.requested_units)
    .bind(run.completed_units)
    .bind(run.errors_count)
    .bind(&run.message)
    .bind(run.created_at)
    .bind(run.started_at)
    .bind(run.finished_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub struct SqliteRunRepository {
    pool: SqlitePool,
}

impl SqliteRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<Run> {
        Ok(Run {
            run_id: row.try_get("run_id")?,
            source_name: row.try_get("source_name")?,
            source_ref: row.try_get("source_ref")?,
            trigger: row.try_get("trigger_type")?,
            status: row.try_get("status")?,
            payload: MappingHelpers::parse_json_sqlite(row, "payload")?,
            requested_units: row.try_get("requested_units")?,
            completed_units: row.try_get("completed_units")?,
            errors_count: row.try_get("errors_count")?,
            message: row.try_get("message")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
        })
    }

    async fn require(&self, run_id: &str) -> SchedulerResult<Run> {
        self.get_by_id(run_id)
            .await?
            .ok_or_else(|| SchedulerError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    /// 条件更新未命中时给出具体原因
    async fn transition_error(&self, run_id: &str, to: RunStatus) -> SchedulerError {
        match self.require(run_id).await {
            Ok(run) => SchedulerError::InvalidRunTransition {
                run_id: run_id.to_string(),
                from: run.status,
                to,
            },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl RunRepository for SqliteRunRepository {
    #[instrument(skip(self, run), fields(
        run_id = %run.run_id,
        source_name = %run.source_name,
        trigger = run.trigger.as_str(),
    ))]
    async fn create(&self, run: &Run) -> SchedulerResult<Run> {
        insert_run(&self.pool, run).await?;
        debug!("创建运行记录成功: {}", run.run_id);
        Ok(run.clone())
    }

    async fn get_by_id(&self, run_id: &str) -> SchedulerResult<Option<Run>> {
        let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM runs WHERE run_id = ?1"))
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_run).transpose()
    }

    async fn list_by_source(&self, source_name: &str, limit: i64) -> SchedulerResult<Vec<Run>> {
        let rows = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE source_name = ?1 \
             ORDER BY created_at DESC LIMIT ?2"
        ))
        .bind(source_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_run).collect()
    }

    async fn find_running_started_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> SchedulerResult<Vec<Run>> {
        let rows = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM runs \
             WHERE status = ?1 AND finished_at IS NULL AND started_at <= ?2 \
             ORDER BY started_at"
        ))
        .bind(RunStatus::Running)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_run).collect()
    }

    async fn mark_running(&self, run_id: &str) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE runs SET status = ?1, started_at = ?2
            WHERE run_id = ?3 AND status = ?4 AND finished_at IS NULL
            "#,
        )
        .bind(RunStatus::Running)
        .bind(Utc::now())
        .bind(run_id)
        .bind(RunStatus::Queued)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(run_id, RunStatus::Running).await);
        }
        debug!("运行开始: {}", run_id);
        Ok(())
    }

    async fn update_progress(&self, run_id: &str, progress: &RunProgress) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE runs SET requested_units = ?1, completed_units = ?2, errors_count = ?3
            WHERE run_id = ?4 AND status = ?5
            "#,
        )
        .bind(progress.requested_units)
        .bind(progress.completed_units)
        .bind(progress.errors_count)
        .bind(run_id)
        .bind(RunStatus::Running)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(run_id, RunStatus::Running).await);
        }
        Ok(())
    }

    #[instrument(skip(self, progress, message), fields(status = status.as_str()))]
    async fn finish(
        &self,
        run_id: &str,
        status: RunStatus,
        progress: &RunProgress,
        message: Option<&str>,
    ) -> SchedulerResult<()> {
        let current = self.require(run_id).await?;
        if current.is_terminal() || !current.status.can_transition_to(status) {
            return Err(SchedulerError::InvalidRunTransition {
                run_id: run_id.to_string(),
                from: current.status,
                to: status,
            });
        }

        // 以读到的状态作为条件，防止并发修改
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET status = ?1, requested_units = ?2, completed_units = ?3, errors_count = ?4,
                message = ?5, finished_at = ?6
            WHERE run_id = ?7 AND status = ?8 AND finished_at IS NULL
            "#,
        )
        .bind(status)
        .bind(progress.requested_units)
        .bind(progress.completed_units)
        .bind(progress.errors_count)
        .bind(message)
        .bind(Utc::now())
        .bind(run_id)
        .bind(current.status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(run_id, status).await);
        }
        debug!("运行结束: {} -> {}", run_id, status);
        Ok(())
    }
}
