//! Termination governor
//!
//! Remaining work per account is always derived from the daily progress store
//! plus the recorder's still-unflushed successes, never from counters kept by
//! the workers. Both are read while flushes are held off, so a batch is never
//! counted in both places or in neither.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::Result;
use crate::progress::ProgressRecorder;
use crate::storage::DailyProgressStore;

/// Tracks remaining targets and decides when a run can stop
pub struct TerminationGovernor {
    store: Arc<dyn DailyProgressStore>,
    recorder: Arc<ProgressRecorder>,
    goal: u32,
    accounts: Vec<String>,
    last_known: Mutex<HashMap<String, u32>>,
}

impl TerminationGovernor {
    pub fn new(
        store: Arc<dyn DailyProgressStore>,
        recorder: Arc<ProgressRecorder>,
        goal: u32,
        accounts: Vec<String>,
    ) -> Self {
        Self {
            store,
            recorder,
            goal,
            accounts,
            last_known: Mutex::new(HashMap::new()),
        }
    }

    /// Per-account goal
    pub fn goal(&self) -> u32 {
        self.goal
    }

    /// Remaining count of every known account
    ///
    /// Fails if the progress store cannot be read.
    pub async fn remaining_all(&self) -> Result<BTreeMap<String, u32>> {
        let _quiet = self.recorder.quiesce().await;
        let stored = self.fetch_stored().await?;
        let pending = self.recorder.pending_by_account();

        Ok(self
            .accounts
            .iter()
            .map(|account| {
                let done = stored.get(account).copied().unwrap_or(0)
                    + pending.get(account).copied().unwrap_or(0);
                (account.clone(), self.goal.saturating_sub(done))
            })
            .collect())
    }

    /// `max(goal − (stored + pending), 0)` for one account
    ///
    /// Falls back to the last successful store read when the store is down.
    pub async fn remaining(&self, account: &str) -> u32 {
        let _quiet = self.recorder.quiesce().await;
        let stored = match self.fetch_stored().await {
            Ok(stored) => stored.get(account).copied().unwrap_or(0),
            Err(e) => {
                warn!(account, error = %e, "Progress store unavailable, using last known count");
                self.cached(account)
            }
        };
        let done = stored + self.recorder.pending_for(account);
        let remaining = self.goal.saturating_sub(done);
        debug!(account, stored, remaining, "Remaining computed");
        remaining
    }

    /// Whether every known account has nothing left to do
    pub async fn should_stop_globally(&self) -> bool {
        let _quiet = self.recorder.quiesce().await;
        let stored = match self.fetch_stored().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Progress store unavailable, using last known counts");
                self.last_known
                    .lock()
                    .map(|m| m.clone())
                    .unwrap_or_default()
            }
        };
        let pending = self.recorder.pending_by_account();

        self.accounts.iter().all(|account| {
            let done = stored.get(account).copied().unwrap_or(0)
                + pending.get(account).copied().unwrap_or(0);
            done >= self.goal
        })
    }

    async fn fetch_stored(&self) -> Result<HashMap<String, u32>> {
        let records = self.store.fetch_today().await?;
        let stored: HashMap<String, u32> = records
            .into_iter()
            .map(|r| (r.account, r.success_count))
            .collect();
        if let Ok(mut cache) = self.last_known.lock() {
            cache.clone_from(&stored);
        }
        Ok(stored)
    }

    fn cached(&self, account: &str) -> u32 {
        self.last_known
            .lock()
            .ok()
            .and_then(|m| m.get(account).copied())
            .unwrap_or(0)
    }
}
