//! Quota-aware credential selection
//!
//! Generation credentials are loaded once into an ordered list. Each has a
//! daily allowance tracked as `{date, count}` in a [`UsageStore`]; a counter
//! whose date is not today counts as zero. The selector always hands out the
//! first credential in priority order that still has allowance.
//!
//! # Usage
//!
//! ```rust,ignore
//! let credentials = load_from_env("GEMINI_API_KEY", 62);
//! let store = Arc::new(JsonFileUsageStore::new("data/credential_usage.json"));
//! let selector = CredentialSelector::load(credentials, store, clock, 200).await?;
//!
//! let credential = selector.reserve().await?; // select + record_use
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{Credential, CredentialUsage};
use crate::utils::Clock;

// ============================================================================
// Loading
// ============================================================================

/// Load credentials from `{prefix}1 ..= {prefix}{slots}` environment variables
///
/// Missing or blank slots are skipped; the result keeps slot order.
pub fn load_from_env(prefix: &str, slots: usize) -> Vec<Credential> {
    load_with(prefix, slots, |name| std::env::var(name).ok())
}

/// Same as [`load_from_env`] with an arbitrary variable lookup
pub fn load_with<F>(prefix: &str, slots: usize, lookup: F) -> Vec<Credential>
where
    F: Fn(&str) -> Option<String>,
{
    (1..=slots)
        .filter_map(|slot| {
            let name = format!("{prefix}{slot}");
            lookup(&name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|secret| Credential::new(name, secret))
        })
        .collect()
}

// ============================================================================
// Usage Stores
// ============================================================================

/// Durable credential usage counters
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Load every stored counter
    async fn load(&self) -> Result<HashMap<String, CredentialUsage>>;

    /// Persist one counter
    async fn save(&self, credential_id: &str, usage: CredentialUsage) -> Result<()>;
}

/// Usage counters kept in a JSON object `{id: {date, count}}`
pub struct JsonFileUsageStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileUsageStore {
    /// Store backed by `path`; the file is created on first save
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_map(&self) -> Result<BTreeMap<String, CredentialUsage>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl UsageStore for JsonFileUsageStore {
    async fn load(&self) -> Result<HashMap<String, CredentialUsage>> {
        Ok(self.read_map().await?.into_iter().collect())
    }

    async fn save(&self, credential_id: &str, usage: CredentialUsage) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut map = self.read_map().await?;
        map.insert(credential_id.to_string(), usage);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&map)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-memory usage store for tests and dry runs
#[derive(Default)]
pub struct MemoryUsageStore {
    entries: Mutex<HashMap<String, CredentialUsage>>,
    saves: Mutex<u64>,
}

impl MemoryUsageStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with counters
    pub fn with_entries(entries: impl IntoIterator<Item = (String, CredentialUsage)>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().collect()),
            saves: Mutex::new(0),
        }
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> u64 {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }

    /// Stored counter of one credential
    pub fn get(&self, credential_id: &str) -> Option<CredentialUsage> {
        self.entries
            .lock()
            .ok()
            .and_then(|m| m.get(credential_id).copied())
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn load(&self) -> Result<HashMap<String, CredentialUsage>> {
        Ok(self.entries.lock()?.clone())
    }

    async fn save(&self, credential_id: &str, usage: CredentialUsage) -> Result<()> {
        self.entries
            .lock()?
            .insert(credential_id.to_string(), usage);
        *self.saves.lock()? += 1;
        Ok(())
    }
}

// ============================================================================
// Selector
// ============================================================================

/// Chooses the first credential with remaining daily allowance
pub struct CredentialSelector {
    credentials: Vec<Credential>,
    usage: tokio::sync::Mutex<HashMap<String, CredentialUsage>>,
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
    daily_limit: u32,
}

impl CredentialSelector {
    /// Build a selector, loading current counters from `store`
    pub async fn load(
        credentials: Vec<Credential>,
        store: Arc<dyn UsageStore>,
        clock: Arc<dyn Clock>,
        daily_limit: u32,
    ) -> Result<Self> {
        let usage = store.load().await?;
        info!(
            credentials = credentials.len(),
            stored = usage.len(),
            daily_limit,
            "Credential selector loaded"
        );
        Ok(Self {
            credentials,
            usage: tokio::sync::Mutex::new(usage),
            store,
            clock,
            daily_limit,
        })
    }

    /// Number of configured credentials
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Whether no credential is configured
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Daily allowance per credential
    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// First credential, in priority order, with allowance left today
    ///
    /// Stale counters encountered on the way are reset to zero for today and
    /// persisted.
    pub async fn select(&self) -> Result<Credential> {
        let mut usage = self.usage.lock().await;
        let index = self.pick(&mut usage).await?;
        Ok(self.credentials[index].clone())
    }

    /// Increment today's counter of `credential_id` and persist it
    pub async fn record_use(&self, credential_id: &str) -> Result<CredentialUsage> {
        let mut usage = self.usage.lock().await;
        Ok(self.increment(&mut usage, credential_id).await)
    }

    /// Select a credential and record one use of it atomically
    ///
    /// Concurrent callers never push a counter past the daily limit.
    pub async fn reserve(&self) -> Result<Credential> {
        let mut usage = self.usage.lock().await;
        let index = self.pick(&mut usage).await?;
        let credential = self.credentials[index].clone();
        let after = self.increment(&mut usage, &credential.id).await;
        debug!(credential = %credential.id, count = after.count, "Credential reserved");
        Ok(credential)
    }

    /// Today's counters for every configured credential, in priority order
    pub async fn snapshot(&self) -> Vec<(String, CredentialUsage)> {
        let today = self.clock.today();
        let usage = self.usage.lock().await;
        self.credentials
            .iter()
            .map(|c| {
                let current = usage
                    .get(&c.id)
                    .copied()
                    .filter(|u| u.date == today)
                    .unwrap_or_else(|| CredentialUsage::fresh(today));
                (c.id.clone(), current)
            })
            .collect()
    }

    async fn pick(&self, usage: &mut HashMap<String, CredentialUsage>) -> Result<usize> {
        let today = self.clock.today();

        for (index, credential) in self.credentials.iter().enumerate() {
            let current = usage.get(&credential.id).copied();
            match current {
                Some(u) if u.date == today => {
                    if u.count < self.daily_limit {
                        return Ok(index);
                    }
                }
                _ => {
                    // Unknown or from another day: starts over at zero
                    let fresh = CredentialUsage::fresh(today);
                    usage.insert(credential.id.clone(), fresh);
                    self.persist(&credential.id, fresh).await;
                    if self.daily_limit > 0 {
                        return Ok(index);
                    }
                }
            }
        }

        Err(Error::QuotaExhausted {
            credentials: self.credentials.len(),
            daily_limit: self.daily_limit,
        })
    }

    async fn increment(
        &self,
        usage: &mut HashMap<String, CredentialUsage>,
        credential_id: &str,
    ) -> CredentialUsage {
        let today = self.clock.today();
        let entry = usage
            .entry(credential_id.to_string())
            .or_insert_with(|| CredentialUsage::fresh(today));
        if entry.date != today {
            *entry = CredentialUsage::fresh(today);
        }
        entry.count += 1;
        let updated = *entry;
        self.persist(credential_id, updated).await;
        updated
    }

    async fn persist(&self, credential_id: &str, usage: CredentialUsage) {
        if let Err(e) = self.store.save(credential_id, usage).await {
            warn!(credential = %credential_id, error = %e, "Failed to persist credential usage");
        }
    }
}
