//! SQLite backend
//!
//! One database file holds accounts, keywords, settings, the daily progress
//! table and the publish audit table. The connection sits behind a `Mutex`;
//! every statement is short, so it is executed inline on the calling task.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{AccountRegistry, DailyProgressStore, KeywordSource, PublishLog, SettingsSource};
use crate::error::{Error, Result};
use crate::models::{Account, DailyProgressRecord, Keyword, ProgressDelta, PublishResult};
use crate::utils::Clock;

const GOAL_SETTING: &str = "post_count";

/// SQLite implementation of every collaborator trait
pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn new(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
            clock,
        };
        store.create_schema()?;

        info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// In-memory database (for testing)
    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            clock,
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.conn.lock()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS accounts (
                    username TEXT PRIMARY KEY,
                    password TEXT NOT NULL,
                    link TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
                );

                CREATE TABLE IF NOT EXISTS keywords (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    keyword TEXT NOT NULL UNIQUE,
                    consumed INTEGER NOT NULL DEFAULT 0,
                    consumed_at TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_keywords_consumed
                    ON keywords(consumed);

                CREATE TABLE IF NOT EXISTS daily_work_records (
                    username TEXT NOT NULL,
                    work_date TEXT NOT NULL,
                    post_count INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (username, work_date)
                );

                CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS publish_results (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL,
                    keyword TEXT NOT NULL,
                    title TEXT NOT NULL,
                    url TEXT NOT NULL,
                    published_at TEXT NOT NULL
                );
                "#,
        )?;
        Ok(())
    }

    fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // ------------------------------------------------------------------------
    // Seeding and inspection
    // ------------------------------------------------------------------------

    /// Insert or replace an account
    pub fn upsert_account(&self, account: &Account) -> Result<()> {
        self.conn.lock()?.execute(
            "INSERT INTO accounts (username, password, link) VALUES (?1, ?2, ?3)
             ON CONFLICT(username) DO UPDATE SET password = excluded.password, link = excluded.link",
            params![account.username, account.password, account.editor_url],
        )?;
        Ok(())
    }

    /// Add keywords, ignoring ones already present; returns how many were new
    pub fn add_keywords<I, S>(&self, keywords: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;
        let mut added = 0;
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO keywords (keyword) VALUES (?1)")?;
            for keyword in keywords {
                let keyword = keyword.as_ref().trim();
                if !keyword.is_empty() {
                    added += stmt.execute(params![keyword])?;
                }
            }
        }
        tx.commit()?;
        Ok(added)
    }

    /// Set the per-account daily goal
    pub fn set_goal(&self, goal: u32) -> Result<()> {
        self.conn.lock()?.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![GOAL_SETTING, goal.to_string()],
        )?;
        Ok(())
    }

    /// Number of consumed keywords
    pub fn consumed_count(&self) -> Result<usize> {
        let count: i64 = self.conn.lock()?.query_row(
            "SELECT COUNT(*) FROM keywords WHERE consumed = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Published results of an account, oldest first
    pub fn published_for(&self, username: &str) -> Result<Vec<PublishResult>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT username, keyword, title, url, published_at FROM publish_results
             WHERE username = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![username], |row| {
            let published_at: String = row.get(4)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                published_at,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (account, keyword, title, published_url, published_at) = row?;
            let timestamp = chrono::DateTime::parse_from_rfc3339(&published_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| Error::with_source("Invalid published_at", e))?;
            results.push(PublishResult {
                account,
                keyword,
                title,
                published_url,
                timestamp,
            });
        }
        Ok(results)
    }
}

#[async_trait]
impl KeywordSource for SqliteStore {
    async fn fetch_unconsumed(&self) -> Result<Vec<Keyword>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare("SELECT keyword FROM keywords WHERE consumed = 0 ORDER BY id")?;
        let keywords = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keywords.into_iter().map(Keyword::new).collect())
    }

    async fn mark_consumed(&self, keyword: &str) -> Result<bool> {
        let changed = self.conn.lock()?.execute(
            "UPDATE keywords SET consumed = 1, consumed_at = ?2 WHERE keyword = ?1 AND consumed = 0",
            params![keyword, Utc::now().to_rfc3339()],
        )?;
        debug!(keyword, changed, "Keyword consume");
        Ok(changed == 1)
    }
}

#[async_trait]
impl AccountRegistry for SqliteStore {
    async fn fetch_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare("SELECT username, password, link FROM accounts ORDER BY rowid")?;
        let accounts = stmt
            .query_map([], |row| {
                Ok(Account::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(accounts)
    }
}

#[async_trait]
impl DailyProgressStore for SqliteStore {
    async fn fetch_today(&self) -> Result<Vec<DailyProgressRecord>> {
        let today = self.today();
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT username, post_count FROM daily_work_records WHERE work_date = ?1 ORDER BY username",
        )?;
        let records = stmt
            .query_map(params![today.to_string()], |row| {
                Ok(DailyProgressRecord {
                    account: row.get(0)?,
                    date: today,
                    success_count: row.get::<_, i64>(1)?.max(0) as u32,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    async fn upsert_batch(&self, deltas: &[ProgressDelta], _auth_token: Option<&str>) -> Result<()> {
        let today = self.today().to_string();
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO daily_work_records (username, work_date, post_count) VALUES (?1, ?2, ?3)
                 ON CONFLICT(username, work_date) DO UPDATE SET post_count = post_count + excluded.post_count",
            )?;
            for delta in deltas {
                stmt.execute(params![delta.account, today, delta.delta])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn ensure_today(&self, accounts: &[String]) -> Result<()> {
        let today = self.today().to_string();
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO daily_work_records (username, work_date, post_count) VALUES (?1, ?2, 0)",
            )?;
            for account in accounts {
                stmt.execute(params![account, today])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[async_trait]
impl SettingsSource for SqliteStore {
    async fn fetch_goal(&self) -> Result<Option<u32>> {
        let value: Option<String> = self
            .conn
            .lock()?
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![GOAL_SETTING],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|v| v.trim().parse().ok()))
    }
}

#[async_trait]
impl PublishLog for SqliteStore {
    async fn append(&self, result: &PublishResult) -> Result<()> {
        self.conn.lock()?.execute(
            "INSERT INTO publish_results (username, keyword, title, url, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                result.account,
                result.keyword,
                result.title,
                result.published_url,
                result.timestamp.to_rfc3339()
            ],
        )?;
        Ok(())
    }
}
