//! SQLite 行映射的共享工具

use scrape_core::{SchedulerError, SchedulerResult};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

pub struct MappingHelpers;

impl MappingHelpers {
    /// 解析以文本存储的 JSON 列
    pub fn parse_json_sqlite(row: &SqliteRow, field_name: &str) -> SchedulerResult<serde_json::Value> {
        let json_str: String = row.try_get(field_name)?;
        serde_json::from_str(&json_str)
            .map_err(|e| SchedulerError::Serialization(format!("解析 {field_name} 失败: {e}")))
    }

    /// 毫秒数以 INTEGER 存储，负值按 0 处理
    pub fn parse_millis_sqlite(row: &SqliteRow, field_name: &str) -> SchedulerResult<u64> {
        let value: i64 = row.try_get(field_name)?;
        Ok(value.max(0) as u64)
    }

    pub fn to_json_text(value: &serde_json::Value) -> SchedulerResult<String> {
        Ok(serde_json::to_string(value)?)
    }
}
