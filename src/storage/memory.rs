//! In-memory backend
//!
//! Implements every collaborator trait over plain collections and records
//! each call, with switches to make the progress store fail. Used by tests
//! and handy for experiments without a database.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{
    AccountRegistry, Collaborators, DailyProgressStore, KeywordSource, PublishLog, SettingsSource,
};
use crate::error::{Error, Result};
use crate::models::{Account, DailyProgressRecord, Keyword, ProgressDelta, PublishResult};
use crate::utils::Clock;

#[derive(Default)]
struct Inner {
    accounts: Vec<Account>,
    keywords: Vec<Keyword>,
    goal: Option<u32>,
    records: BTreeMap<(String, NaiveDate), u32>,
    upserts: Vec<Vec<ProgressDelta>>,
    consume_calls: Vec<String>,
    published: Vec<PublishResult>,
    fail_upserts: bool,
    fail_fetch_today: bool,
    fail_settings: bool,
}

/// In-memory implementation of every collaborator trait
pub struct MemoryStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    /// Copy accounts, unconsumed keywords, the goal and today's counts of `source`
    ///
    /// An unreadable goal setting is copied as unset.
    pub async fn snapshot(source: &Collaborators, clock: Arc<dyn Clock>) -> Result<Self> {
        let memory = Self::new(clock);

        memory.add_accounts(source.accounts.fetch_accounts().await?);
        memory.add_keywords(
            source
                .keywords
                .fetch_unconsumed()
                .await?
                .into_iter()
                .map(|k| k.text),
        );
        memory.set_goal(source.settings.fetch_goal().await.unwrap_or(None));
        for record in source.progress.fetch_today().await? {
            memory.set_today_count(&record.account, record.success_count);
        }

        Ok(memory)
    }

    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut inner)
    }

    /// Register accounts
    pub fn add_accounts(&self, accounts: impl IntoIterator<Item = Account>) {
        self.with(|i| i.accounts.extend(accounts));
    }

    /// Add unconsumed keywords
    pub fn add_keywords<S: Into<String>>(&self, keywords: impl IntoIterator<Item = S>) {
        self.with(|i| i.keywords.extend(keywords.into_iter().map(Keyword::new)));
    }

    /// Set the per-account goal
    pub fn set_goal(&self, goal: Option<u32>) {
        self.with(|i| i.goal = goal);
    }

    /// Overwrite today's count of an account
    pub fn set_today_count(&self, account: &str, count: u32) {
        let today = self.clock.today();
        self.with(|i| {
            i.records.insert((account.to_string(), today), count);
        });
    }

    /// Make `upsert_batch` fail until switched back
    pub fn fail_upserts(&self, fail: bool) {
        self.with(|i| i.fail_upserts = fail);
    }

    /// Make `fetch_today` fail until switched back
    pub fn fail_fetch_today(&self, fail: bool) {
        self.with(|i| i.fail_fetch_today = fail);
    }

    /// Make `fetch_goal` fail until switched back
    pub fn fail_settings(&self, fail: bool) {
        self.with(|i| i.fail_settings = fail);
    }

    /// Every `upsert_batch` call, including failed ones, in order
    pub fn upsert_calls(&self) -> Vec<Vec<ProgressDelta>> {
        self.with(|i| i.upserts.clone())
    }

    /// Every `mark_consumed` argument, in order
    pub fn consume_calls(&self) -> Vec<String> {
        self.with(|i| i.consume_calls.clone())
    }

    /// Consumed keywords
    pub fn consumed(&self) -> Vec<String> {
        self.with(|i| {
            i.keywords
                .iter()
                .filter(|k| k.consumed)
                .map(|k| k.text.clone())
                .collect()
        })
    }

    /// Today's count of an account
    pub fn today_count(&self, account: &str) -> u32 {
        let today = self.clock.today();
        self.with(|i| {
            i.records
                .get(&(account.to_string(), today))
                .copied()
                .unwrap_or(0)
        })
    }

    /// Appended publish results
    pub fn published(&self) -> Vec<PublishResult> {
        self.with(|i| i.published.clone())
    }
}

#[async_trait]
impl KeywordSource for MemoryStore {
    async fn fetch_unconsumed(&self) -> Result<Vec<Keyword>> {
        Ok(self.with(|i| i.keywords.iter().filter(|k| !k.consumed).cloned().collect()))
    }

    async fn mark_consumed(&self, keyword: &str) -> Result<bool> {
        Ok(self.with(|i| {
            i.consume_calls.push(keyword.to_string());
            match i.keywords.iter_mut().find(|k| k.text == keyword) {
                Some(k) if !k.consumed => {
                    k.consumed = true;
                    true
                }
                _ => false,
            }
        }))
    }
}

#[async_trait]
impl AccountRegistry for MemoryStore {
    async fn fetch_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.with(|i| i.accounts.clone()))
    }
}

#[async_trait]
impl DailyProgressStore for MemoryStore {
    async fn fetch_today(&self) -> Result<Vec<DailyProgressRecord>> {
        let today = self.clock.today();
        self.with(|i| {
            if i.fail_fetch_today {
                return Err(Error::Api {
                    status: 503,
                    message: "progress store unavailable".into(),
                });
            }
            Ok(i.records
                .iter()
                .filter(|((_, date), _)| *date == today)
                .map(|((account, date), count)| DailyProgressRecord {
                    account: account.clone(),
                    date: *date,
                    success_count: *count,
                })
                .collect())
        })
    }

    async fn upsert_batch(&self, deltas: &[ProgressDelta], _auth_token: Option<&str>) -> Result<()> {
        let today = self.clock.today();
        self.with(|i| {
            i.upserts.push(deltas.to_vec());
            if i.fail_upserts {
                return Err(Error::Api {
                    status: 500,
                    message: "upsert rejected".into(),
                });
            }
            for delta in deltas {
                *i.records
                    .entry((delta.account.clone(), today))
                    .or_insert(0) += delta.delta;
            }
            Ok(())
        })
    }

    async fn ensure_today(&self, accounts: &[String]) -> Result<()> {
        let today = self.clock.today();
        self.with(|i| {
            for account in accounts {
                i.records.entry((account.clone(), today)).or_insert(0);
            }
        });
        Ok(())
    }
}

#[async_trait]
impl SettingsSource for MemoryStore {
    async fn fetch_goal(&self) -> Result<Option<u32>> {
        self.with(|i| {
            if i.fail_settings {
                Err(Error::Api {
                    status: 500,
                    message: "settings unavailable".into(),
                })
            } else {
                Ok(i.goal)
            }
        })
    }
}

#[async_trait]
impl PublishLog for MemoryStore {
    async fn append(&self, result: &PublishResult) -> Result<()> {
        self.with(|i| i.published.push(result.clone()));
        Ok(())
    }
}
