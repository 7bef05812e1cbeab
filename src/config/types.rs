use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Catalog-Probe
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default, rename = "agency")]
    pub agencies: Vec<AgencyEntry>,
}

/// Task queue behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of tasks running at once
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: u32,

    /// URL check tasks started per second
    #[serde(default = "default_check_rate_limit")]
    pub check_rate_limit: f64,

    /// How many times a task failing on persistence is run again
    #[serde(default = "default_max_task_retries")]
    pub max_task_retries: u32,

    /// Delay before a failed task is retried (milliseconds)
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
}

impl CrawlerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            check_rate_limit: default_check_rate_limit(),
            max_task_retries: default_max_task_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpConfig {
    /// Whole-request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Connection timeout (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Redirects followed before giving up
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Largest response body kept for an inspection
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            max_redirects: default_max_redirects(),
            max_content_bytes: default_max_content_bytes(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Catalog validation configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidationConfig {
    /// JSON Schema for data catalogs; validation is skipped without one
    #[serde(default, rename = "catalog-schema-path")]
    pub catalog_schema_path: Option<PathBuf>,
}

/// An agency publishing a data catalog
#[derive(Debug, Clone, Deserialize)]
pub struct AgencyEntry {
    /// Display name, unique across the configuration
    pub name: String,

    /// Location of the agency's `data.json`
    #[serde(rename = "data-json-url")]
    pub data_json_url: String,
}

fn default_max_concurrent_tasks() -> u32 {
    8
}

fn default_check_rate_limit() -> f64 {
    10.0
}

fn default_max_task_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    10
}

fn default_max_content_bytes() -> usize {
    64 * 1024 * 1024
}
