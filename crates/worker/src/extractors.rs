use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use scrape_core::models::RawRecord;
use scrape_core::traits::{ExtractionRequest, Extractor};
use scrape_core::ExtractionError;

/// 按抓取源选择抽取函数
///
/// 未单独注册的源使用默认抽取函数（如果设置了）。
#[derive(Default, Clone)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn Extractor>>,
    fallback: Option<Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, source_name: impl Into<String>, extractor: Arc<dyn Extractor>) -> Self {
        let source_name = source_name.into();
        info!("注册抽取函数: {}", source_name);
        self.extractors.insert(source_name, extractor);
        self
    }

    pub fn with_fallback(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.fallback = Some(extractor);
        self
    }

    pub fn resolve(&self, source_name: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors
            .get(source_name)
            .or(self.fallback.as_ref())
            .cloned()
    }

    pub fn registered_sources(&self) -> Vec<String> {
        self.extractors.keys().cloned().collect()
    }
}

/// `HttpJsonExtractor` 读取的 payload 参数
#[derive(Debug, Clone, Deserialize)]
pub struct HttpJsonParams {
    /// 列表页地址，`{page}` 会被替换为页码
    pub url: String,
    #[serde(default = "default_page_start")]
    pub page_start: i64,
    /// JSON Pointer，指向条目数组；为空时响应本身就是数组
    #[serde(default)]
    pub items_path: String,
    /// 条目中作为自然键的字段
    #[serde(default = "default_url_field")]
    pub url_field: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub timeout_seconds: Option<u64>,
}

fn default_page_start() -> i64 {
    1
}

fn default_url_field() -> String {
    "url".to_string()
}

impl HttpJsonParams {
    pub fn from_payload(payload: &Value) -> Result<Self, ExtractionError> {
        serde_json::from_value(payload.clone())
            .map_err(|e| ExtractionError::Fatal(format!("invalid http_json payload: {e}")))
    }

    pub fn page_url(&self, unit: i32) -> String {
        let page = self.page_start + i64::from(unit);
        self.url.replace("{page}", &page.to_string())
    }
}

/// 分页 JSON 列表接口的通用抽取函数
///
/// 5xx、429 与网络错误视为临时错误，其他非 2xx 状态与 payload 错误视为致命错误。
pub struct HttpJsonExtractor {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HttpJsonExtractor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            default_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            default_timeout: Duration::from_secs(30),
        }
    }

    fn to_records(body: &Value, params: &HttpJsonParams) -> Result<Vec<RawRecord>, ExtractionError> {
        let items = if params.items_path.is_empty() {
            Some(body)
        } else {
            body.pointer(&params.items_path)
        };

        let items = items.and_then(Value::as_array).ok_or_else(|| {
            ExtractionError::Fatal(format!(
                "response has no item array at '{}'",
                params.items_path
            ))
        })?;

        Ok(items
            .iter()
            .map(|item| RawRecord {
                item_url: item
                    .get(&params.url_field)
                    .and_then(Value::as_str)
                    .map(str::to_string),
                fields: item.clone(),
            })
            .collect())
    }
}

impl Default for HttpJsonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for HttpJsonExtractor {
    async fn extract_unit(
        &self,
        request: ExtractionRequest<'_>,
    ) -> Result<Vec<RawRecord>, ExtractionError> {
        let params = HttpJsonParams::from_payload(request.payload)?;
        let url = params.page_url(request.unit);
        let timeout = params
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        debug!(run_id = request.run_id, source_name = request.source_name, %url, "抓取页面");

        let mut builder = self.client.get(&url).timeout(timeout);
        for (key, value) in &params.headers {
            builder = builder.header(key, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                ExtractionError::Fatal(format!("invalid request for {url}: {e}"))
            } else {
                ExtractionError::Transient(format!("request to {url} failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ExtractionError::Transient(format!("{url} returned {status}")));
        }
        if !status.is_success() {
            return Err(ExtractionError::Fatal(format!("{url} returned {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ExtractionError::Transient(format!("invalid JSON from {url}: {e}")))?;

        Self::to_records(&body, &params)
    }
}
