//! External collaborators of a publishing run
//!
//! The orchestrator consumes keywords, accounts, settings and daily progress
//! through the traits below and writes an audit entry per published post.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Runner / ProgressRecorder / Governor             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  KeywordSource, AccountRegistry, DailyProgressStore,        │
//! │  SettingsSource, PublishLog                                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │     SQLite      │ │  Admin REST API │ │    In-memory    │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! No implementation provides distributed locking. The progress upsert is
//! atomic per row; keyword consumption is a conditional update where the
//! backend supports it.

pub mod api;
pub mod audit;
pub mod memory;
pub mod sqlite;

pub use api::AdminApiClient;
pub use audit::JsonlPublishLog;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Account, DailyProgressRecord, Keyword, ProgressDelta, PublishResult};

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Source of work items
#[async_trait]
pub trait KeywordSource: Send + Sync {
    /// Unconsumed keywords in listing order
    async fn fetch_unconsumed(&self) -> Result<Vec<Keyword>>;

    /// Mark a keyword consumed
    ///
    /// Returns `true` when this call performed the transition and `false`
    /// when the keyword was already consumed or unknown.
    async fn mark_consumed(&self, keyword: &str) -> Result<bool>;
}

/// Registry of publishing accounts
#[async_trait]
pub trait AccountRegistry: Send + Sync {
    async fn fetch_accounts(&self) -> Result<Vec<Account>>;
}

/// Durable per-account, per-day success counters
#[async_trait]
pub trait DailyProgressStore: Send + Sync {
    /// Today's records
    async fn fetch_today(&self) -> Result<Vec<DailyProgressRecord>>;

    /// Add each delta to today's row of its account, inserting missing rows
    ///
    /// The whole batch is applied or none of it is.
    async fn upsert_batch(&self, deltas: &[ProgressDelta], auth_token: Option<&str>) -> Result<()>;

    /// Insert a zero row for every account lacking one today
    async fn ensure_today(&self, accounts: &[String]) -> Result<()>;
}

/// Run settings
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Per-account daily goal, if configured
    async fn fetch_goal(&self) -> Result<Option<u32>>;
}

/// Append-only record of published posts
#[async_trait]
pub trait PublishLog: Send + Sync {
    async fn append(&self, result: &PublishResult) -> Result<()>;
}

/// Every collaborator a run needs
#[derive(Clone)]
pub struct Collaborators {
    pub keywords: Arc<dyn KeywordSource>,
    pub accounts: Arc<dyn AccountRegistry>,
    pub progress: Arc<dyn DailyProgressStore>,
    pub settings: Arc<dyn SettingsSource>,
    pub publish_log: Arc<dyn PublishLog>,
}

impl Collaborators {
    /// All collaborators served by one backend
    pub fn from_backend<B>(backend: Arc<B>, publish_log: Arc<dyn PublishLog>) -> Self
    where
        B: KeywordSource + AccountRegistry + DailyProgressStore + SettingsSource + 'static,
    {
        Self {
            keywords: backend.clone(),
            accounts: backend.clone(),
            progress: backend.clone(),
            settings: backend,
            publish_log,
        }
    }
}

/// Publish log that writes to several logs in order, stopping at the first error
pub struct TeePublishLog {
    logs: Vec<Arc<dyn PublishLog>>,
}

impl TeePublishLog {
    pub fn new(logs: Vec<Arc<dyn PublishLog>>) -> Self {
        Self { logs }
    }
}

#[async_trait]
impl PublishLog for TeePublishLog {
    async fn append(&self, result: &PublishResult) -> Result<()> {
        for log in &self.logs {
            log.append(result).await?;
        }
        Ok(())
    }
}

/// Publish log that forwards to another log and keeps what it accepted
///
/// Only entries the inner log stored are kept, in append order.
pub struct RecordingPublishLog {
    inner: Arc<dyn PublishLog>,
    recorded: Mutex<Vec<PublishResult>>,
}

impl RecordingPublishLog {
    pub fn new(inner: Arc<dyn PublishLog>) -> Self {
        Self {
            inner,
            recorded: Mutex::new(Vec::new()),
        }
    }

    /// Entries appended so far
    pub fn recorded(&self) -> Vec<PublishResult> {
        self.recorded.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PublishLog for RecordingPublishLog {
    async fn append(&self, result: &PublishResult) -> Result<()> {
        self.inner.append(result).await?;
        self.recorded.lock()?.push(result.clone());
        Ok(())
    }
}
