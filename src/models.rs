//! Core data structures shared across the orchestrator

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A publishing target account
///
/// Owned by the external account registry and immutable during a run.
/// `username` doubles as the account key in progress records.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    /// Login name, also the progress key
    pub username: String,

    /// Login password
    pub password: String,

    /// Editor URL where a new post is composed
    #[serde(alias = "link")]
    pub editor_url: String,
}

impl Account {
    /// Create a new account
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        editor_url: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            editor_url: editor_url.into(),
        }
    }

    /// Whether both login fields are present
    pub fn has_credentials(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("editor_url", &self.editor_url)
            .finish()
    }
}

/// A content topic waiting to be published
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Keyword {
    /// Topic text, unique in the keyword source
    pub text: String,

    /// Whether a successful session already consumed it
    #[serde(default)]
    pub consumed: bool,
}

impl Keyword {
    /// Create an unconsumed keyword
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            consumed: false,
        }
    }
}

/// A generation credential, in priority order
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Stable identifier (the slot name, e.g. `GEMINI_API_KEY3`)
    pub id: String,

    /// Secret key sent to the service
    pub secret: String,
}

impl Credential {
    /// Create a credential
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Daily usage counter of one credential
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialUsage {
    /// Calendar day the count belongs to
    pub date: NaiveDate,

    /// Generation calls made on `date`
    pub count: u32,
}

impl CredentialUsage {
    /// Fresh counter for a day
    pub fn fresh(date: NaiveDate) -> Self {
        Self { date, count: 0 }
    }
}

/// Title and body produced by the generative service
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedContent {
    /// Post title
    pub title: String,

    /// Post body (HTML)
    pub content: String,
}

impl GeneratedContent {
    /// Both parts are present
    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && !self.content.trim().is_empty()
    }
}

/// Append-only fact of one fully successful publishing session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishResult {
    /// Account username
    pub account: String,

    /// Keyword that was consumed
    pub keyword: String,

    /// Title of the post
    pub title: String,

    /// URL of the published post
    pub published_url: String,

    /// When the session finished
    pub timestamp: DateTime<Utc>,
}

/// Per-account, per-day count of confirmed publications
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyProgressRecord {
    /// Account username
    #[serde(alias = "username")]
    pub account: String,

    /// Calendar day
    #[serde(alias = "work_date")]
    pub date: NaiveDate,

    /// Confirmed successes on `date`
    #[serde(alias = "post_count")]
    pub success_count: u32,
}

/// One entry of a batched progress upsert
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressDelta {
    /// Account username
    pub account: String,

    /// Successes to add to today's record
    pub delta: u32,
}

impl ProgressDelta {
    /// Create a delta
    pub fn new(account: impl Into<String>, delta: u32) -> Self {
        Self {
            account: account.into(),
            delta,
        }
    }
}

/// Goals computed once at the start of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTarget {
    /// Successes each account should reach today
    pub per_account_goal: u32,

    /// Sum of every eligible account's remaining count at start
    pub global_goal: u32,
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every account reached its goal
    GoalReached,
    /// No unconsumed keywords were left to claim
    KeywordsExhausted,
    /// No credential had allowance left
    QuotaExhausted,
    /// `RunHandle::stop` was called
    Cancelled,
    /// Nothing was eligible at start
    NothingToDo,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GoalReached => "goal reached",
            Self::KeywordsExhausted => "keywords exhausted",
            Self::QuotaExhausted => "quota exhausted",
            Self::Cancelled => "cancelled",
            Self::NothingToDo => "nothing to do",
        };
        f.write_str(s)
    }
}

/// Aggregate outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run identifier
    pub run_id: String,

    /// Goals at start
    pub target: RunTarget,

    /// Publishing sessions started
    pub sessions_started: u64,

    /// Sessions that reached `Done`
    pub succeeded: u64,

    /// Keyword tasks that failed at any step
    pub failed: u64,

    /// Successes confirmed by the progress store during this run
    pub flushed: u64,

    /// Successes counted but never confirmed (store unavailable at shutdown)
    pub pending_unflushed: u64,

    /// Why the run ended
    pub stop_reason: StopReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_debug_redacts_password() {
        let account = Account::new("writer1", "hunter2", "https://blog.example/wp-admin/post-new.php");
        let debug = format!("{account:?}");
        assert!(debug.contains("writer1"));
        assert!(!debug.contains("hunter2"));
        assert!(account.has_credentials());
    }

    #[test]
    fn test_account_deserializes_registry_shape() {
        let account: Account = serde_json::from_str(
            r#"{"username":"a","password":"p","link":"https://x.example/wp-admin/post-new.php"}"#,
        )
        .unwrap();
        assert_eq!(account.editor_url, "https://x.example/wp-admin/post-new.php");
    }

    #[test]
    fn test_generated_content_completeness() {
        let mut content = GeneratedContent {
            title: "제목".into(),
            content: "<p>본문</p>".into(),
        };
        assert!(content.is_complete());
        content.title = "   ".into();
        assert!(!content.is_complete());
    }

    #[test]
    fn test_progress_record_aliases() {
        let record: DailyProgressRecord = serde_json::from_str(
            r#"{"username":"a","work_date":"2025-01-15","post_count":7}"#,
        )
        .unwrap();
        assert_eq!(record.account, "a");
        assert_eq!(record.success_count, 7);
    }
}
