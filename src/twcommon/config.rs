//! Crawler daemon configuration.

use serde::{Deserialize, Serialize};

use crate::twcommon::error::{AppError, Result};
use crate::twcommon::proxy::ProxyKind;

const DEFAULT_CONFIG_PATH: &str = "config/crawler.toml";

/// 系統設定常數
pub mod constants {
    /// Default number of parallel fetch workers.
    pub const DEFAULT_FETCH_WORKERS: usize = 4;

    /// Default pause between request admissions (milliseconds).
    pub const DEFAULT_RATE_LIMIT_MS: u64 = 2000;

    /// Per-request HTTP timeout (seconds).
    pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

    /// Weekdays at 10:30 UTC (18:30 Taipei), after both exchanges settle.
    pub const DEFAULT_CRON_SPEC: &str = "0 30 10 * * Mon-Fri";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    #[serde(default)]
    pub crawler: CrawlSection,

    #[serde(default)]
    pub proxy: ProxySection,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSection {
    /// Parallel fetch workers in the download stage.
    pub fetch_workers: usize,

    /// Pause between request admissions, milliseconds.
    pub rate_limit_ms: u64,

    /// Per-request HTTP timeout, seconds.
    pub http_timeout_secs: u64,

    /// JSON file with the stock universe used for concentration crawls.
    pub stock_list_path: String,

    /// How many days back each scheduled run re-queries.
    pub rewind_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySection {
    pub use_proxy: bool,
    pub kind: ProxyKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// Cron expression (with seconds field) for the crawl trigger.
    pub spec: String,

    /// Lock TTL in minutes held while one replica runs the tick.
    pub lock_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Default level when RUST_LOG is absent.
    pub level: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            crawler: CrawlSection::default(),
            proxy: ProxySection::default(),
            scheduler: SchedulerSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            fetch_workers: constants::DEFAULT_FETCH_WORKERS,
            rate_limit_ms: constants::DEFAULT_RATE_LIMIT_MS,
            http_timeout_secs: constants::DEFAULT_HTTP_TIMEOUT_SECS,
            stock_list_path: "config/stock_ids.json".to_string(),
            rewind_days: 0,
        }
    }
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            use_proxy: false,
            kind: ProxyKind::WebScraping,
        }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            spec: constants::DEFAULT_CRON_SPEC.to_string(),
            lock_minutes: 5,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CrawlerConfig {
    /// Load from `CONFIG_PATH` (or the default location), falling back to
    /// the built-in defaults when no file exists.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if !std::path::Path::new(&path).exists() {
            // the subscriber is not up yet at load time
            eprintln!("config file {path} not found, using defaults");
            return Ok(Self::default());
        }

        Self::from_file(&path)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::ConfigError(format!("failed to parse {path}: {e}")))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.crawler.fetch_workers == 0 {
            return Err(AppError::ConfigError(
                "crawler.fetch_workers must be greater than 0".to_string(),
            ));
        }

        if self.crawler.http_timeout_secs == 0 {
            return Err(AppError::ConfigError(
                "crawler.http_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.scheduler.spec.trim().is_empty() {
            return Err(AppError::ConfigError(
                "scheduler.spec must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(CrawlerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut config = CrawlerConfig::default();
        config.crawler.fetch_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parses_partial_toml() {
        let config: CrawlerConfig = toml::from_str(
            r#"
            [crawler]
            fetch_workers = 2
            rate_limit_ms = 500
            http_timeout_secs = 30
            stock_list_path = "config/stock_ids.json"
            rewind_days = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.crawler.fetch_workers, 2);
        assert_eq!(config.scheduler.spec, constants::DEFAULT_CRON_SPEC);
    }
}
