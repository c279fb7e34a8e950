use async_trait::async_trait;
use chrono::Utc;
use scrape_core::{
    models::{PersistOutcome, RawRecord, ScrapedEntity},
    traits::EntityRepository,
    SchedulerResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use crate::database::mapping::MappingHelpers;
use crate::validation::partition_records;

pub struct SqliteEntityRepository {
    pool: SqlitePool,
}

impl SqliteEntityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_entity(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<ScrapedEntity> {
        Ok(ScrapedEntity {
            id: row.try_get("id")?,
            source_name: row.try_get("source_name")?,
            item_url: row.try_get("item_url")?,
            fields: MappingHelpers::parse_json_sqlite(row, "fields")?,
            run_id: row.try_get("run_id")?,
            ingested_at: row.try_get("ingested_at")?,
        })
    }
}

#[async_trait]
impl EntityRepository for SqliteEntityRepository {
    #[instrument(skip(self, records), fields(batch_size = records.len()))]
    async fn persist_batch(
        &self,
        records: &[RawRecord],
        source_name: &str,
        run_id: Option<&str>,
    ) -> SchedulerResult<PersistOutcome> {
        // 校验在事务之外完成，坏记录不会回滚整批
        let (valid, rejected) = partition_records(records, source_name);
        let mut outcome = PersistOutcome {
            errors: rejected.len() as u64,
            rejected,
            ..PersistOutcome::default()
        };

        if valid.is_empty() {
            return Ok(outcome);
        }

        let ingested_at = Utc::now();
        let mut tx = self.pool.begin().await?;
        for record in &valid {
            let result = sqlx::query(
                r#"
                INSERT INTO scraped_entities (source_name, item_url, fields, run_id, ingested_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(source_name, item_url) DO NOTHING
                "#,
            )
            .bind(source_name)
            .bind(&record.item_url)
            .bind(&record.fields)
            .bind(run_id)
            .bind(ingested_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                outcome.skipped_duplicates += 1;
            } else {
                outcome.inserted += 1;
            }
        }
        tx.commit().await?;

        debug!(
            inserted = outcome.inserted,
            skipped_duplicates = outcome.skipped_duplicates,
            errors = outcome.errors,
            "批量写入完成"
        );
        Ok(outcome)
    }

    async fn count_entities(&self, source_name: &str) -> SchedulerResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM scraped_entities WHERE source_name = ?1")
            .bind(source_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    async fn get_entity(
        &self,
        source_name: &str,
        item_url: &str,
    ) -> SchedulerResult<Option<ScrapedEntity>> {
        let row = sqlx::query(
            "SELECT id, source_name, item_url, fields, run_id, ingested_at \
             FROM scraped_entities WHERE source_name = ?1 AND item_url = ?2",
        )
        .bind(source_name)
        .bind(item_url)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_entity).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use serde_json::json;

    fn valid_records(n: usize) -> Vec<RawRecord> {
        (0..n)
            .map(|i| {
                RawRecord::new(
                    format!("https://jobs.example.com/post/{i}"),
                    json!({"title": format!("Engineer {i}")}),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_malformed_records_are_counted_not_fatal() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = db.entity_repository();

        let mut records = valid_records(5);
        records.insert(2, RawRecord::without_url(json!({"title": "no url"})));
        records.push(RawRecord::new("   ", json!({"title": "blank url"})));

        let outcome = repo.persist_batch(&records, "board", Some("run-1")).await.unwrap();
        assert_eq!(outcome.inserted, 5);
        assert_eq!(outcome.errors, 2);
        assert_eq!(outcome.skipped_duplicates, 0);
        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(outcome.rejected[0].index, 2);
        assert_eq!(repo.count_entities("board").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_replaying_batch_is_idempotent() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = db.entity_repository();
        let records = valid_records(4);

        let first = repo.persist_batch(&records, "board", Some("run-1")).await.unwrap();
        assert_eq!(first.inserted, 4);

        let second = repo.persist_batch(&records, "board", Some("run-2")).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_duplicates, 4);
        assert_eq!(second.errors, 0);
        assert_eq!(repo.count_entities("board").await.unwrap(), 4);

        // ingested_at 与 run_id 保持首次写入时的值
        let entity = repo
            .get_entity("board", "https://jobs.example.com/post/0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entity.run_id.as_deref(), Some("run-1"));
    }

    #[tokio::test]
    async fn test_natural_key_uses_canonical_url() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = db.entity_repository();
        let records = vec![
            RawRecord::new("https://Example.com/job/1#top", json!({"v": 1})),
            RawRecord::new("https://example.com/job/1", json!({"v": 2})),
        ];

        let outcome = repo.persist_batch(&records, "board", None).await.unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.skipped_duplicates, 1);

        let entity = repo
            .get_entity("board", "https://example.com/job/1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entity.fields, json!({"v": 1}));
    }

    #[tokio::test]
    async fn test_same_url_different_sources() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = db.entity_repository();
        let records = valid_records(1);

        repo.persist_batch(&records, "board-a", None).await.unwrap();
        let outcome = repo.persist_batch(&records, "board-b", None).await.unwrap();
        assert_eq!(outcome.inserted, 1);
    }
}
