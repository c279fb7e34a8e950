use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scrape_core::{
    models::{PacingConfig, Run, SourceSchedule},
    traits::SourceScheduleRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use super::sqlite_run_repository::insert_run;
use crate::database::mapping::MappingHelpers;

const SCHEDULE_COLUMNS: &str = "source_name, enabled, interval_seconds, last_run_at, next_run_at, \
     payload, pacing_min_ms, pacing_max_ms, max_retries, created_at, updated_at";

pub struct SqliteSourceScheduleRepository {
    pool: SqlitePool,
}

impl SqliteSourceScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_schedule(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<SourceSchedule> {
        Ok(SourceSchedule {
            source_name: row.try_get("source_name")?,
            enabled: row.try_get("enabled")?,
            interval_seconds: row.try_get("interval_seconds")?,
            last_run_at: row.try_get("last_run_at")?,
            next_run_at: row.try_get("next_run_at")?,
            payload: MappingHelpers::parse_json_sqlite(row, "payload")?,
            pacing: PacingConfig::new(
                MappingHelpers::parse_millis_sqlite(row, "pacing_min_ms")?,
                MappingHelpers::parse_millis_sqlite(row, "pacing_max_ms")?,
            ),
            max_retries: row.try_get("max_retries")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn require(&self, source_name: &str) -> SchedulerResult<SourceSchedule> {
        self.get(source_name)
            .await?
            .ok_or_else(|| SchedulerError::ScheduleNotFound {
                source_name: source_name.to_string(),
            })
    }
}

#[async_trait]
impl SourceScheduleRepository for SqliteSourceScheduleRepository {
    #[instrument(skip(self, schedule), fields(source_name = %schedule.source_name))]
    async fn upsert(&self, schedule: &SourceSchedule) -> SchedulerResult<SourceSchedule> {
        schedule.validate()?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO source_schedules (source_name, enabled, interval_seconds, last_run_at, next_run_at,
                                          payload, pacing_min_ms, pacing_max_ms, max_retries, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ON CONFLICT(source_name) DO UPDATE SET
                enabled = excluded.enabled,
                interval_seconds = excluded.interval_seconds,
                payload = excluded.payload,
                pacing_min_ms = excluded.pacing_min_ms,
                pacing_max_ms = excluded.pacing_max_ms,
                max_retries = excluded.max_retries,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&schedule.source_name)
        .bind(schedule.enabled)
        .bind(schedule.interval_seconds)
        .bind(schedule.last_run_at)
        .bind(schedule.next_run_at)
        .bind(MappingHelpers::to_json_text(&schedule.payload)?)
        .bind(schedule.pacing.min_delay_ms as i64)
        .bind(schedule.pacing.max_delay_ms as i64)
        .bind(schedule.max_retries)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!("保存调度配置成功: {}", schedule.source_name);
        self.require(&schedule.source_name).await
    }

    async fn get(&self, source_name: &str) -> SchedulerResult<Option<SourceSchedule>> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM source_schedules WHERE source_name = ?1"
        ))
        .bind(source_name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_schedule).transpose()
    }

    async fn list(&self) -> SchedulerResult<Vec<SourceSchedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM source_schedules ORDER BY source_name"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_schedule).collect()
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: Option<i64>,
    ) -> SchedulerResult<Vec<SourceSchedule>> {
        // SQLite 中 LIMIT -1 表示不限制
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM source_schedules \
             WHERE enabled = 1 AND next_run_at <= ?1 \
             ORDER BY next_run_at ASC LIMIT ?2"
        ))
        .bind(now)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_schedule).collect()
    }

    async fn set_enabled(
        &self,
        source_name: &str,
        enabled: bool,
    ) -> SchedulerResult<SourceSchedule> {
        let result = sqlx::query(
            "UPDATE source_schedules SET enabled = ?1, updated_at = ?2 WHERE source_name = ?3",
        )
        .bind(enabled)
        .bind(Utc::now())
        .bind(source_name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::ScheduleNotFound {
                source_name: source_name.to_string(),
            });
        }

        debug!("更新调度配置启用状态: {} -> {}", source_name, enabled);
        self.require(source_name).await
    }

    #[instrument(skip(self, run), fields(run_id = %run.run_id))]
    async fn advance_and_create_run(
        &self,
        source_name: &str,
        now: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
        run: &Run,
    ) -> SchedulerResult<bool> {
        let mut tx = self.pool.begin().await?;

        // 比较并设置：只有仍然到期的配置才会被推进
        let result = sqlx::query(
            r#"
            UPDATE source_schedules
            SET last_run_at = ?1, next_run_at = ?2, updated_at = ?1
            WHERE source_name = ?3 AND enabled = 1 AND next_run_at <= ?1
            "#,
        )
        .bind(now)
        .bind(next_run_at)
        .bind(source_name)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            debug!("调度配置已被推进，跳过: {}", source_name);
            return Ok(false);
        }

        insert_run(&mut *tx, run).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn delete(&self, source_name: &str) -> SchedulerResult<bool> {
        let result = sqlx::query("DELETE FROM source_schedules WHERE source_name = ?1")
            .bind(source_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use chrono::Duration;
    use scrape_core::RunStatus;
    use serde_json::json;

    #[tokio::test]
    async fn test_upsert_preserves_schedule_state() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = db.schedule_repository();
        let next = Utc::now() + Duration::minutes(42);

        let schedule = SourceSchedule::new("board", Duration::minutes(60))
            .with_payload(json!({"query": "rust"}))
            .with_next_run_at(next);
        repo.upsert(&schedule).await.unwrap();

        let updated = SourceSchedule::new("board", Duration::minutes(15))
            .with_payload(json!({"query": "go"}))
            .with_pacing(PacingConfig::new(10, 20))
            .disabled();
        let saved = repo.upsert(&updated).await.unwrap();

        assert_eq!(saved.interval_seconds, 15 * 60);
        assert_eq!(saved.payload, json!({"query": "go"}));
        assert_eq!(saved.pacing, PacingConfig::new(10, 20));
        assert!(!saved.enabled);
        assert_eq!(saved.next_run_at, next);
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_schedule() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = db.schedule_repository();
        let schedule = SourceSchedule::new("board", Duration::zero());
        assert!(matches!(
            repo.upsert(&schedule).await,
            Err(SchedulerError::InvalidSchedule(_))
        ));
    }

    #[tokio::test]
    async fn test_find_due_skips_disabled_and_future() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = db.schedule_repository();
        let now = Utc::now();

        for schedule in [
            SourceSchedule::new("due", Duration::minutes(60))
                .with_next_run_at(now - Duration::minutes(1)),
            SourceSchedule::new("future", Duration::minutes(60))
                .with_next_run_at(now + Duration::minutes(1)),
            SourceSchedule::new("disabled", Duration::minutes(60))
                .with_next_run_at(now - Duration::minutes(5))
                .disabled(),
        ] {
            repo.upsert(&schedule).await.unwrap();
        }

        let due = repo.find_due(now, None).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].source_name, "due");
    }

    #[tokio::test]
    async fn test_advance_is_compare_and_set() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = db.schedule_repository();
        let runs = db.run_repository();
        let now = Utc::now();
        let schedule = SourceSchedule::new("board", Duration::minutes(60))
            .with_next_run_at(now - Duration::minutes(1));
        repo.upsert(&schedule).await.unwrap();

        let first = Run::scheduled(&schedule);
        let next = now + Duration::minutes(60);
        assert!(repo
            .advance_and_create_run("board", now, next, &first)
            .await
            .unwrap());

        // 同一时刻重复调度不会再次创建运行
        let second = Run::scheduled(&schedule);
        assert!(!repo
            .advance_and_create_run("board", now, next, &second)
            .await
            .unwrap());

        let stored = repo.get("board").await.unwrap().unwrap();
        assert_eq!(stored.next_run_at, next);
        assert_eq!(stored.last_run_at, Some(now));

        let created = runs.get_by_id(&first.run_id).await.unwrap().unwrap();
        assert_eq!(created.status, RunStatus::Queued);
        assert!(runs.get_by_id(&second.run_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_enabled_unknown_source() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = db.schedule_repository();
        let err = repo.set_enabled("missing", false).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_detaches_runs() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = db.schedule_repository();
        let runs = db.run_repository();
        let schedule = SourceSchedule::new("board", Duration::minutes(60));
        repo.upsert(&schedule).await.unwrap();
        let run = Run::scheduled(&schedule);
        runs.create(&run).await.unwrap();

        assert!(repo.delete("board").await.unwrap());
        let detached = runs.get_by_id(&run.run_id).await.unwrap().unwrap();
        assert_eq!(detached.source_ref, None);
        assert_eq!(detached.source_name, "board");
    }
}
