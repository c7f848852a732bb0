//! In-run keyword claims
//!
//! Keeps two account workers of the same run from publishing the same
//! keyword, and stops a keyword that keeps failing from being dispatched
//! forever. Claims are process-local; the keyword source's conditional
//! consume is the only guard against other processes.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::models::Keyword;

#[derive(Debug, Default)]
struct ClaimState {
    in_flight: HashSet<String>,
    completed: HashSet<String>,
    failures: HashMap<String, u32>,
}

/// Keyword claims of one run
#[derive(Debug)]
pub struct KeywordClaims {
    state: Mutex<ClaimState>,
    max_attempts: u32,
}

impl KeywordClaims {
    /// Claims allowing `max_attempts` failed attempts per keyword (at least one)
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: Mutex::new(ClaimState::default()),
            max_attempts: max_attempts.max(1),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ClaimState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim up to `limit` of `candidates`, in listing order
    pub fn claim(&self, candidates: &[Keyword], limit: usize) -> Vec<String> {
        let mut state = self.state();
        let mut claimed = Vec::new();

        for keyword in candidates {
            if claimed.len() >= limit {
                break;
            }
            let text = &keyword.text;
            if keyword.consumed
                || state.in_flight.contains(text)
                || state.completed.contains(text)
                || state.failures.get(text).copied().unwrap_or(0) >= self.max_attempts
            {
                continue;
            }
            state.in_flight.insert(text.clone());
            claimed.push(text.clone());
        }
        claimed
    }

    /// The keyword was published
    pub fn complete(&self, keyword: &str) {
        let mut state = self.state();
        state.in_flight.remove(keyword);
        state.completed.insert(keyword.to_string());
    }

    /// The attempt failed; returns the keyword's failure count in this run
    pub fn release_failed(&self, keyword: &str) -> u32 {
        let mut state = self.state();
        state.in_flight.remove(keyword);
        let failures = state.failures.entry(keyword.to_string()).or_insert(0);
        *failures += 1;
        *failures
    }

    /// Give the keyword back without counting an attempt
    pub fn release(&self, keyword: &str) {
        self.state().in_flight.remove(keyword);
    }

    /// Keywords currently being worked
    pub fn in_flight(&self) -> usize {
        self.state().in_flight.len()
    }
}
