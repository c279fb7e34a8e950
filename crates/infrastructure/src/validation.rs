//! 抓取记录的校验与自然键规范化
//!
//! 校验失败只影响单条记录：调用方把它计入 `errors` 并继续处理其余记录。

use scrape_core::models::{RawRecord, RejectedRecord};
use url::Url;

/// 通过校验、可直接写入的记录
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRecord {
    pub index: usize,
    pub item_url: String,
    pub fields: String,
}

/// 规范化条目URL
///
/// 解析时协议与主机名被转为小写，片段（`#...`）被移除，
/// 这样同一条目的不同写法会落到同一个自然键上。
pub fn canonicalize_item_url(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("missing item_url".to_string());
    }

    let mut url = Url::parse(trimmed).map_err(|e| format!("invalid item_url: {e}"))?;
    if !url.has_host() {
        return Err(format!("item_url has no host: {trimmed}"));
    }
    url.set_fragment(None);
    Ok(url.to_string())
}

/// 校验单条记录
pub fn validate_record(
    index: usize,
    record: &RawRecord,
    source_name: &str,
) -> Result<ValidRecord, RejectedRecord> {
    let reject = |reason: String| RejectedRecord {
        index,
        item_url: record.item_url.clone(),
        reason,
    };

    if source_name.trim().is_empty() {
        return Err(reject("missing source_name".to_string()));
    }

    let item_url = match record.item_url.as_deref() {
        Some(raw) => canonicalize_item_url(raw).map_err(reject)?,
        None => return Err(reject("missing item_url".to_string())),
    };

    if !record.fields.is_object() {
        return Err(reject("fields must be a JSON object".to_string()));
    }

    let fields = serde_json::to_string(&record.fields).map_err(|e| reject(e.to_string()))?;

    Ok(ValidRecord {
        index,
        item_url,
        fields,
    })
}

/// 把一批记录分为可写入与被拒绝两部分，保持原有顺序
pub fn partition_records(
    records: &[RawRecord],
    source_name: &str,
) -> (Vec<ValidRecord>, Vec<RejectedRecord>) {
    let mut valid = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();

    for (index, record) in records.iter().enumerate() {
        match validate_record(index, record, source_name) {
            Ok(record) => valid.push(record),
            Err(rejection) => rejected.push(rejection),
        }
    }

    (valid, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonicalize_strips_fragment_and_lowercases_host() {
        assert_eq!(
            canonicalize_item_url("  HTTPS://Jobs.Example.COM/post/1#apply ").unwrap(),
            "https://jobs.example.com/post/1"
        );
        assert_eq!(
            canonicalize_item_url("https://example.com/a?id=7").unwrap(),
            "https://example.com/a?id=7"
        );
    }

    #[test]
    fn test_canonicalize_rejects_bad_urls() {
        assert!(canonicalize_item_url("").is_err());
        assert!(canonicalize_item_url("not a url").is_err());
        assert!(canonicalize_item_url("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_partition_keeps_valid_records() {
        let records = vec![
            RawRecord::new("https://example.com/1", json!({"title": "a"})),
            RawRecord::without_url(json!({"title": "b"})),
            RawRecord::new("https://example.com/2", json!("scalar")),
            RawRecord::new("https://example.com/3", json!({})),
        ];

        let (valid, rejected) = partition_records(&records, "board");
        assert_eq!(valid.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(rejected.len(), 2);
        assert_eq!(rejected[0].index, 1);
        assert_eq!(rejected[0].reason, "missing item_url");
        assert_eq!(rejected[1].reason, "fields must be a JSON object");
    }

    #[test]
    fn test_blank_source_rejects_everything() {
        let records = vec![RawRecord::new("https://example.com/1", json!({}))];
        let (valid, rejected) = partition_records(&records, " ");
        assert!(valid.is_empty());
        assert_eq!(rejected[0].reason, "missing source_name");
    }
}
