//! Test fixtures for integration tests
//!
//! Provides accounts, keywords and a harness wiring the runner to in-memory
//! collaborators, a mock generator and the scripted browser.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use autopost::credentials::{CredentialSelector, MemoryUsageStore};
use autopost::generator::MockGenerator;
use autopost::models::{Account, Credential};
use autopost::runner::{RunSettings, Runner};
use autopost::session::{ScriptedBehavior, ScriptedLauncher, SessionSettings, EditorSelectors};
use autopost::storage::{Collaborators, MemoryStore};
use autopost::utils::{FixedClock, RetryPolicy};

/// Calendar day every test runs on
pub fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
}

pub fn test_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(test_date()))
}

/// `count` accounts named `writer1`, `writer2`, ...
pub fn sample_accounts(count: usize) -> Vec<Account> {
    (1..=count)
        .map(|i| {
            Account::new(
                format!("writer{i}"),
                format!("pw-{i}"),
                format!("https://blog{i}.example/wp-admin/post-new.php"),
            )
        })
        .collect()
}

/// `count` keywords named `keyword-01`, `keyword-02`, ...
pub fn sample_keywords(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("keyword-{i:02}")).collect()
}

pub fn sample_credentials(count: usize) -> Vec<Credential> {
    (1..=count)
        .map(|i| Credential::new(format!("GEMINI_API_KEY{i}"), format!("secret-{i}")))
        .collect()
}

/// Run settings without pauses or backoff
pub fn fast_settings() -> RunSettings {
    RunSettings {
        retry: RetryPolicy::new(3, Duration::ZERO),
        session: SessionSettings::immediate(),
        ..RunSettings::default()
    }
}

/// Everything a test run needs, with handles for assertions
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub generator: Arc<MockGenerator>,
    pub launcher: Arc<ScriptedLauncher>,
    pub usage: Arc<MemoryUsageStore>,
    pub credentials: Arc<CredentialSelector>,
    pub settings: RunSettings,
}

impl Harness {
    pub async fn new(accounts: usize, keywords: usize, goal: Option<u32>) -> Self {
        Self::with_parts(
            accounts,
            keywords,
            goal,
            MockGenerator::new(),
            ScriptedBehavior::default(),
            sample_credentials(2),
            200,
        )
        .await
    }

    pub async fn with_parts(
        accounts: usize,
        keywords: usize,
        goal: Option<u32>,
        generator: MockGenerator,
        behavior: ScriptedBehavior,
        credentials: Vec<Credential>,
        daily_limit: u32,
    ) -> Self {
        let clock = test_clock();
        let store = Arc::new(MemoryStore::new(clock.clone()));
        store.add_accounts(sample_accounts(accounts));
        store.add_keywords(sample_keywords(keywords));
        store.set_goal(goal);

        let usage = Arc::new(MemoryUsageStore::new());
        let credentials = Arc::new(
            CredentialSelector::load(credentials, usage.clone(), clock, daily_limit)
                .await
                .unwrap(),
        );

        Self {
            store,
            generator: Arc::new(generator),
            launcher: Arc::new(ScriptedLauncher::new(behavior, EditorSelectors::default())),
            usage,
            credentials,
            settings: fast_settings(),
        }
    }

    pub fn runner(&self) -> Runner {
        Runner::new(
            Collaborators::from_backend(self.store.clone(), self.store.clone()),
            self.generator.clone(),
            self.credentials.clone(),
            self.launcher.clone(),
            self.settings.clone(),
        )
    }
}
