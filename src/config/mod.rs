//! Configuration management for autopost
//!
//! Configuration is loaded from a TOML file or from environment variables,
//! with every field falling back to the defaults below. Generation credentials
//! are not part of this structure; see [`crate::credentials::load_from_env`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run orchestration
    pub runner: RunnerConfig,

    /// Generative service client
    pub generator: GeneratorConfig,

    /// Browser automation
    pub browser: BrowserConfig,

    /// Local storage
    pub storage: StorageConfig,

    /// Admin REST API (used when `storage.backend = "api"`)
    pub api: ApiConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Command run after a live run
    pub hooks: HooksConfig,
}

/// Run orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum number of accounts worked concurrently
    pub account_concurrency: usize,

    /// Maximum number of keywords in flight per account
    pub keyword_concurrency: usize,

    /// Keywords claimed per dispatch cycle (capped by the account's remaining goal)
    pub keyword_batch_size: usize,

    /// Aggregate pending successes that trigger a progress flush
    pub flush_threshold: usize,

    /// Per-account goal used when the settings source has none
    pub default_goal: u32,

    /// Attempts per keyword within one run before it is skipped
    pub max_keyword_attempts: u32,

    /// Published URLs kept per account for backlinking
    pub recent_url_window: usize,

    /// Calendar-day offset from UTC in hours
    pub utc_offset_hours: i32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            account_concurrency: 5,
            keyword_concurrency: 5,
            keyword_batch_size: 5,
            flush_threshold: 10,
            default_goal: 10,
            max_keyword_attempts: 2,
            recent_url_window: 5,
            utc_offset_hours: 9,
        }
    }
}

/// Generative service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Service base URL
    pub endpoint: String,

    /// Model name
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Generation calls allowed per credential per day
    pub daily_limit: u32,

    /// Requests per minute across all credentials
    pub requests_per_minute: u32,

    /// Attempts for a rate-limited generation call
    pub max_attempts: u32,

    /// Linear backoff unit in milliseconds (wait = attempt * unit)
    pub retry_unit_ms: u64,

    /// Environment variable prefix for credentials (`PREFIX1`, `PREFIX2`, ...)
    pub credential_env_prefix: String,

    /// Highest credential slot scanned
    pub credential_slots: usize,

    /// Optional handlebars prompt template file
    pub prompt_template: Option<PathBuf>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("https://generativelanguage.googleapis.com"),
            model: String::from("gemini-1.5-flash"),
            timeout_secs: 120,
            daily_limit: 200,
            requests_per_minute: 15,
            max_attempts: 3,
            retry_unit_ms: 1000,
            credential_env_prefix: String::from("GEMINI_API_KEY"),
            credential_slots: 62,
            prompt_template: None,
        }
    }
}

/// Browser automation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run Chromium without a window
    pub headless: bool,

    /// Explicit Chromium executable
    pub executable: Option<PathBuf>,

    /// Readiness-wait attempts per element
    pub wait_attempts: u32,

    /// Timeout of a single readiness-wait attempt in seconds
    pub wait_timeout_secs: u64,

    /// Pause between readiness-wait attempts in milliseconds
    pub wait_retry_pause_ms: u64,

    /// Pause after each form-field interaction in milliseconds
    pub field_pause_ms: u64,

    /// Pause before reading the published URL in milliseconds
    pub publish_settle_ms: u64,

    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            wait_attempts: 3,
            wait_timeout_secs: 60,
            wait_retry_pause_ms: 2000,
            field_pause_ms: 500,
            publish_settle_ms: 1500,
            navigation_timeout_secs: 60,
        }
    }
}

/// Which implementation backs the external collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local SQLite database
    Sqlite,
    /// Admin REST API
    Api,
}

/// Local storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Collaborator backend
    pub backend: StorageBackend,

    /// SQLite database path
    pub sqlite_path: PathBuf,

    /// Credential usage file
    pub usage_path: PathBuf,

    /// JSONL audit log of published posts
    pub audit_log_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite_path: PathBuf::from("data/autopost.db"),
            usage_path: PathBuf::from("data/credential_usage.json"),
            audit_log_path: PathBuf::from("data/published.jsonl"),
        }
    }
}

/// Admin REST API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the admin service
    pub base_url: String,

    /// Bearer token for authenticated endpoints
    pub auth_token: Option<String>,

    /// Key required by the progress upsert endpoint
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("http://localhost:3000"),
            auth_token: None,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

/// Post-run hook settings
///
/// When `post_run_command` is set, a live run writes the links it published
/// to `export_path` and then runs the command with that path appended to
/// `post_run_args`. Dry runs never trigger the hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// Program to run
    pub post_run_command: Option<String>,

    /// Arguments placed before the export path
    pub post_run_args: Vec<String>,

    /// JSON file handed to the command
    pub export_path: PathBuf,

    /// Seconds before the command is killed
    pub timeout_secs: u64,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            post_run_command: None,
            post_run_args: Vec::new(),
            export_path: PathBuf::from("data/published_links.json"),
            timeout_secs: 1800,
        }
    }
}

impl HooksConfig {
    /// Limit on the command's run time
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from `path` when given, else from defaults, then apply the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields with the environment variables that are set
    pub fn apply_env(&mut self) -> Result<()> {
        let config = self;

        let runner = &mut config.runner;
        if let Some(v) = env_parse("AUTOPOST_ACCOUNT_CONCURRENCY") {
            runner.account_concurrency = v;
        }
        if let Some(v) = env_parse("AUTOPOST_KEYWORD_CONCURRENCY") {
            runner.keyword_concurrency = v;
        }
        if let Some(v) = env_parse("AUTOPOST_KEYWORD_BATCH_SIZE") {
            runner.keyword_batch_size = v;
        }
        if let Some(v) = env_parse("AUTOPOST_FLUSH_THRESHOLD") {
            runner.flush_threshold = v;
        }
        if let Some(v) = env_parse("AUTOPOST_DEFAULT_GOAL") {
            runner.default_goal = v;
        }

        let generator = &mut config.generator;
        if let Ok(v) = std::env::var("AUTOPOST_GENERATOR_ENDPOINT") {
            generator.endpoint = v;
        }
        if let Ok(v) = std::env::var("AUTOPOST_GENERATOR_MODEL") {
            generator.model = v;
        }
        if let Some(v) = env_parse("AUTOPOST_DAILY_LIMIT") {
            generator.daily_limit = v;
        }
        if let Some(v) = env_parse("AUTOPOST_REQUESTS_PER_MINUTE") {
            generator.requests_per_minute = v;
        }

        if let Some(v) = env_parse("AUTOPOST_HEADLESS") {
            config.browser.headless = v;
        }
        if let Ok(v) = std::env::var("AUTOPOST_CHROME") {
            config.browser.executable = Some(PathBuf::from(v));
        }

        if let Ok(v) = std::env::var("AUTOPOST_BACKEND") {
            config.storage.backend = match v.to_lowercase().as_str() {
                "sqlite" => StorageBackend::Sqlite,
                "api" => StorageBackend::Api,
                other => anyhow::bail!("Unknown storage backend: {other}. Valid: sqlite, api"),
            };
        }
        if let Ok(v) = std::env::var("AUTOPOST_SQLITE_PATH") {
            config.storage.sqlite_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("AUTOPOST_USAGE_PATH") {
            config.storage.usage_path = PathBuf::from(v);
        }

        if let Ok(v) = std::env::var("LOCAL_SERVER_URL") {
            config.api.base_url = v;
        }
        if let Ok(v) = std::env::var("AUTH_TOKEN") {
            config.api.auth_token = Some(v);
        }
        if let Ok(v) = std::env::var("API_KEY") {
            config.api.api_key = Some(v);
        }

        if let Ok(v) = std::env::var("AUTOPOST_POST_RUN_COMMAND") {
            config.hooks.post_run_command = Some(v);
        }

        if let Ok(v) = std::env::var("AUTOPOST_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("AUTOPOST_LOG_FORMAT") {
            config.logging.format = v;
        }

        Ok(())
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.runner.account_concurrency == 0 {
            anyhow::bail!("account_concurrency must be greater than 0");
        }

        if self.runner.keyword_concurrency == 0 {
            anyhow::bail!("keyword_concurrency must be greater than 0");
        }

        if self.runner.keyword_batch_size == 0 {
            anyhow::bail!("keyword_batch_size must be greater than 0");
        }

        if self.runner.flush_threshold == 0 {
            anyhow::bail!("flush_threshold must be greater than 0");
        }

        if !(-12..=14).contains(&self.runner.utc_offset_hours) {
            anyhow::bail!("utc_offset_hours must be within -12..=14");
        }

        if self.generator.max_attempts == 0 {
            anyhow::bail!("generator.max_attempts must be greater than 0");
        }

        if self.generator.requests_per_minute == 0 {
            anyhow::bail!("generator.requests_per_minute must be greater than 0");
        }

        if self.browser.wait_attempts == 0 {
            anyhow::bail!("browser.wait_attempts must be greater than 0");
        }

        url::Url::parse(&self.generator.endpoint).context("Invalid generator endpoint")?;
        if self.storage.backend == StorageBackend::Api {
            url::Url::parse(&self.api.base_url).context("Invalid admin API base URL")?;
        }

        if self.hooks.post_run_command.as_deref().is_some_and(|c| c.trim().is_empty()) {
            anyhow::bail!("hooks.post_run_command must not be empty");
        }

        Ok(())
    }
}
