//! autopost - Bulk content publishing orchestrator
//!
//! Pulls unconsumed keywords, generates posts through a rate-limited
//! generative service, publishes them per account by driving a browser, and
//! tracks daily per-account progress against a goal.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`credentials`] - Generation credentials and their daily quotas
//! - [`generator`] - Generative service client and content post-processing
//! - [`session`] - Browser automation and the publishing state machine
//! - [`runner`] - Two-tier bounded dispatch of accounts and keywords, run assembly
//! - [`hooks`] - Handing published links to an external command after a run
//! - [`progress`] - Batched daily progress recording
//! - [`termination`] - Remaining-goal tracking and early stop
//! - [`storage`] - External collaborators (SQLite, admin API, in-memory)
//! - [`models`] - Core data structures and types
//! - [`utils`] - Clock, retry policy and text helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use autopost::config::Config;
//! use autopost::credentials::{self, CredentialSelector, JsonFileUsageStore};
//! use autopost::generator::GeminiClient;
//! use autopost::runner::{RunSettings, Runner};
//! use autopost::session::ChromiumLauncher;
//! use autopost::storage::{Collaborators, SqliteStore};
//! use autopost::utils::OffsetClock;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let clock = Arc::new(OffsetClock::new(config.runner.utc_offset_hours));
//!     let store = Arc::new(SqliteStore::new(&config.storage.sqlite_path, clock.clone())?);
//!     let collaborators = Collaborators::from_backend(store.clone(), store);
//!
//!     let selector = CredentialSelector::load(
//!         credentials::load_from_env("GEMINI_API_KEY", 62),
//!         Arc::new(JsonFileUsageStore::new(&config.storage.usage_path)),
//!         clock,
//!         config.generator.daily_limit,
//!     )
//!     .await?;
//!
//!     let summary = Runner::new(
//!         collaborators,
//!         Arc::new(GeminiClient::new(&config.generator)?),
//!         Arc::new(selector),
//!         Arc::new(ChromiumLauncher::new(&config.browser)),
//!         RunSettings::from_config(&config),
//!     )
//!     .run()
//!     .await?;
//!     println!("SUCCESS_COUNT: {}", summary.succeeded);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod generator;
pub mod hooks;
pub mod models;
pub mod progress;
pub mod runner;
pub mod session;
pub mod storage;
pub mod termination;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::credentials::CredentialSelector;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::generator::ContentGenerator;
    pub use crate::models::{Account, Keyword, PublishResult, RunSummary, StopReason};
    pub use crate::runner::{RunHandle, RunSettings, Runner};
    pub use crate::storage::Collaborators;
}

// Direct re-exports for convenience
pub use models::{Account, Keyword, RunSummary, StopReason};
