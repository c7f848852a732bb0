//! Batched progress recording
//!
//! Successful sessions are recorded as individual events carrying a sequence
//! number. A flush aggregates every pending event into one delta per account
//! and sends the batch as a single upsert. When the store confirms, exactly
//! the events that were sent are dropped; events recorded while the upsert was
//! in flight stay pending for the next flush. A failed upsert drops nothing.
//!
//! At most one flush runs at a time. Crossing the threshold while a flush is
//! running skips the flush; otherwise the recorder waits for any reader
//! holding [`ProgressRecorder::quiesce`] and flushes if the threshold is still
//! met. [`ProgressRecorder::flush`] always waits for a running flush.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::MutexGuard;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::ProgressDelta;
use crate::storage::DailyProgressStore;

#[derive(Debug, Default)]
struct Pending {
    next_seq: u64,
    events: Vec<(u64, String)>,
}

/// Accumulates successes and flushes them to the daily progress store
pub struct ProgressRecorder {
    store: Arc<dyn DailyProgressStore>,
    auth_token: Option<String>,
    threshold: usize,
    pending: Mutex<Pending>,
    flush_guard: tokio::sync::Mutex<()>,
    flushing: AtomicBool,
    flushed: AtomicU64,
}

/// Marks a flush in flight until dropped
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ProgressRecorder {
    pub fn new(
        store: Arc<dyn DailyProgressStore>,
        threshold: usize,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            store,
            auth_token,
            threshold: threshold.max(1),
            pending: Mutex::new(Pending::default()),
            flush_guard: tokio::sync::Mutex::new(()),
            flushing: AtomicBool::new(false),
            flushed: AtomicU64::new(0),
        }
    }

    fn pending_state(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one confirmed publication for `account`
    ///
    /// Returns the event's sequence number. Flush failures are logged and
    /// leave the events pending.
    pub async fn record_success(&self, account: &str) -> u64 {
        let (seq, total) = {
            let mut pending = self.pending_state();
            let seq = pending.next_seq;
            pending.next_seq += 1;
            pending.events.push((seq, account.to_string()));
            (seq, pending.events.len())
        };
        debug!(account, seq, pending = total, "Success recorded");

        if total >= self.threshold {
            if self.flushing.load(Ordering::SeqCst) {
                debug!("Flush already in progress");
                return seq;
            }

            let _guard = self.flush_guard.lock().await;
            let still_pending = self.pending_total();
            if still_pending < self.threshold {
                debug!(pending = still_pending, "Threshold cleared by an earlier flush");
            } else if let Err(e) = self.flush_locked().await {
                warn!(error = %e, pending = still_pending, "Progress flush failed, keeping batch");
            }
        }
        seq
    }

    /// Flush every pending event, waiting for a running flush first
    ///
    /// Returns the number of events confirmed by the store.
    pub async fn flush(&self) -> Result<usize> {
        let _guard = self.flush_guard.lock().await;
        self.flush_locked().await
    }

    /// Hold off flushes while reading store and pending counts together
    pub async fn quiesce(&self) -> MutexGuard<'_, ()> {
        self.flush_guard.lock().await
    }

    async fn flush_locked(&self) -> Result<usize> {
        let _in_flight = InFlight::start(&self.flushing);
        let (upto, deltas, count) = {
            let pending = self.pending_state();
            let Some(&(last, _)) = pending.events.last() else {
                return Ok(0);
            };
            let mut per_account: BTreeMap<&str, u32> = BTreeMap::new();
            for (_, account) in &pending.events {
                *per_account.entry(account.as_str()).or_insert(0) += 1;
            }
            let deltas: Vec<ProgressDelta> = per_account
                .into_iter()
                .map(|(account, delta)| ProgressDelta::new(account, delta))
                .collect();
            (last, deltas, pending.events.len())
        };

        self.store
            .upsert_batch(&deltas, self.auth_token.as_deref())
            .await
            .map_err(|e| Error::BatchFlush(e.to_string()))?;

        self.pending_state().events.retain(|(seq, _)| *seq > upto);
        self.flushed.fetch_add(count as u64, Ordering::SeqCst);
        info!(events = count, accounts = deltas.len(), "Progress batch flushed");
        Ok(count)
    }

    /// Pending (unconfirmed) successes per account
    pub fn pending_by_account(&self) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for (_, account) in &self.pending_state().events {
            *counts.entry(account.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Pending successes of one account
    pub fn pending_for(&self, account: &str) -> u32 {
        self.pending_state()
            .events
            .iter()
            .filter(|(_, a)| a == account)
            .count() as u32
    }

    /// Total pending successes
    pub fn pending_total(&self) -> usize {
        self.pending_state().events.len()
    }

    /// Successes confirmed by the store so far
    pub fn flushed_total(&self) -> u64 {
        self.flushed.load(Ordering::SeqCst)
    }

    /// Successes recorded so far
    pub fn recorded_total(&self) -> u64 {
        self.pending_state().next_seq
    }
}
