//! 配置管理
//!
//! 配置按以下顺序加载，后者覆盖前者：
//!
//! 1. 各配置段的默认值
//! 2. TOML 配置文件（`--config` 指定，或默认搜索路径）
//! 3. 以 `SCRAPE_` 为前缀、`__` 分隔层级的环境变量，例如
//!    `SCRAPE_WORKER__ERROR_TOLERANCE=0.2`
//!
//! 每个配置段都有 `validate()`，加载完成后统一校验。
//!
//! ```rust
//! use scrape_core::config::AppConfig;
//!
//! let config = AppConfig::from_toml(
//!     r#"
//! [worker]
//! concurrency = 4
//! error_tolerance = 0.25
//!
//! [[sources]]
//! source_name = "remote-jobs"
//! interval_seconds = 3600
//! payload = { query = "rust", pages = 3 }
//! "#,
//! )
//! .unwrap();
//! assert_eq!(config.worker.concurrency, 4);
//! assert_eq!(config.sources.len(), 1);
//! ```

pub mod models;

pub use models::*;
