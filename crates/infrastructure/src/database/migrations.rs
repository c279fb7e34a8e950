use scrape_core::SchedulerResult;
use sqlx::SqlitePool;
use tracing::debug;

/// 运行数据库迁移
///
/// 时间列统一由应用写入 RFC3339 文本，不使用 `CURRENT_TIMESTAMP` 默认值，
/// 以保证 `next_run_at <= ?` 这类比较按字典序成立。
pub async fn run_migrations(pool: &SqlitePool) -> SchedulerResult<()> {
    debug!("Running SQLite database migrations");

    // 抓取源调度配置表
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_schedules (
            source_name TEXT PRIMARY KEY,
            enabled INTEGER NOT NULL DEFAULT 1,
            interval_seconds INTEGER NOT NULL CHECK (interval_seconds > 0),
            last_run_at DATETIME,
            next_run_at DATETIME NOT NULL,
            payload TEXT NOT NULL DEFAULT '{}',
            pacing_min_ms INTEGER NOT NULL DEFAULT 0,
            pacing_max_ms INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // 运行记录表，临时运行的 source_ref 为空
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            run_id TEXT PRIMARY KEY,
            source_name TEXT NOT NULL,
            source_ref TEXT,
            trigger_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'queued',
            payload TEXT NOT NULL DEFAULT '{}',
            requested_units INTEGER NOT NULL DEFAULT 0,
            completed_units INTEGER NOT NULL DEFAULT 0,
            errors_count INTEGER NOT NULL DEFAULT 0,
            message TEXT,
            created_at DATETIME NOT NULL,
            started_at DATETIME,
            finished_at DATETIME,
            FOREIGN KEY (source_ref) REFERENCES source_schedules (source_name) ON DELETE SET NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // 抓取实体表，自然键唯一约束在存储层强制
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scraped_entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_name TEXT NOT NULL,
            item_url TEXT NOT NULL,
            fields TEXT NOT NULL DEFAULT '{}',
            run_id TEXT,
            ingested_at DATETIME NOT NULL,
            UNIQUE (source_name, item_url)
        )
        "#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_source_schedules_due ON source_schedules(enabled, next_run_at)",
        "CREATE INDEX IF NOT EXISTS idx_runs_source_name ON runs(source_name, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status)",
        "CREATE INDEX IF NOT EXISTS idx_scraped_entities_run_id ON scraped_entities(run_id)",
    ];

    for index_sql in indexes {
        sqlx::query(index_sql).execute(pool).await?;
    }

    debug!("Successfully completed SQLite database migrations");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let tables: Vec<String> = rows.iter().map(|r| r.get("name")).collect();
        assert_eq!(tables, vec!["runs", "scraped_entities", "source_schedules"]);
    }
}
