use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 抽取函数返回的候选记录，尚未校验
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawRecord {
    pub item_url: Option<String>,
    pub fields: serde_json::Value,
}

impl RawRecord {
    pub fn new(item_url: impl Into<String>, fields: serde_json::Value) -> Self {
        Self {
            item_url: Some(item_url.into()),
            fields,
        }
    }

    /// 缺少自然键的记录
    pub fn without_url(fields: serde_json::Value) -> Self {
        Self {
            item_url: None,
            fields,
        }
    }
}

/// 已持久化的抓取实体
///
/// 自然键为 (`source_name`, `item_url`)，`ingested_at` 只在首次插入时写入。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapedEntity {
    pub id: i64,
    pub source_name: String,
    pub item_url: String,
    pub fields: serde_json::Value,
    pub run_id: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

/// 校验失败的单条记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RejectedRecord {
    pub index: usize,
    pub item_url: Option<String>,
    pub reason: String,
}

/// 一次批量持久化的结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistOutcome {
    pub inserted: u64,
    pub skipped_duplicates: u64,
    pub errors: u64,
    pub rejected: Vec<RejectedRecord>,
}

impl PersistOutcome {
    pub fn merge(&mut self, other: PersistOutcome) {
        self.inserted += other.inserted;
        self.skipped_duplicates += other.skipped_duplicates;
        self.errors += other.errors;
        self.rejected.extend(other.rejected);
    }

    pub fn total(&self) -> u64 {
        self.inserted + self.skipped_duplicates + self.errors
    }
}
