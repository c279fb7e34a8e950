use async_trait::async_trait;

use crate::errors::ExtractionError;
use crate::models::RawRecord;

/// 一次单元抽取的输入
#[derive(Debug, Clone)]
pub struct ExtractionRequest<'a> {
    pub run_id: &'a str,
    pub source_name: &'a str,
    pub payload: &'a serde_json::Value,
    /// 从 0 开始的单元序号（通常是页码）
    pub unit: i32,
}

/// 可注入的抽取函数
///
/// 执行器只依赖这个接口，不关心具体抓取源的实现。一次运行被拆成若干单元，
/// 执行器逐个调用 `extract_unit`，在单元之间插入随机暂停。
#[async_trait]
pub trait Extractor: Send + Sync {
    /// 计算本次运行的单元数量，默认读取 payload 中的 `pages`，缺省为 1
    async fn plan_units(
        &self,
        _source_name: &str,
        payload: &serde_json::Value,
    ) -> Result<i32, ExtractionError> {
        match payload.get("pages") {
            None => Ok(1),
            Some(value) => value
                .as_i64()
                .filter(|pages| *pages > 0 && *pages <= i64::from(i32::MAX))
                .map(|pages| pages as i32)
                .ok_or_else(|| ExtractionError::Fatal(format!("invalid pages value: {value}"))),
        }
    }

    /// 抽取单个单元，返回候选记录
    async fn extract_unit(
        &self,
        request: ExtractionRequest<'_>,
    ) -> Result<Vec<RawRecord>, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl Extractor for Noop {
        async fn extract_unit(
            &self,
            _request: ExtractionRequest<'_>,
        ) -> Result<Vec<RawRecord>, ExtractionError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_default_plan_reads_pages() {
        assert_eq!(Noop.plan_units("s", &json!({})).await, Ok(1));
        assert_eq!(Noop.plan_units("s", &json!({"pages": 4})).await, Ok(4));
        assert!(Noop
            .plan_units("s", &json!({"pages": 0}))
            .await
            .unwrap_err()
            .is_fatal());
        assert!(Noop.plan_units("s", &json!({"pages": "x"})).await.is_err());
    }
}
