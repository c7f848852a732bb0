//! Wiring a [`Runner`] from configuration
//!
//! A live run talks to the generative service, drives Chromium and writes
//! usage and progress back to the configured stores. A dry run reads the same
//! inputs once and then works entirely in memory: stores are snapshotted,
//! usage counters are seeded from the usage file but never saved, content
//! comes from [`MockGenerator`] and the browser is scripted. Nothing leaves
//! the process and nothing is written back.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use super::{RunSettings, Runner};
use crate::config::Config;
use crate::credentials::{CredentialSelector, JsonFileUsageStore, MemoryUsageStore, UsageStore};
use crate::error::Result;
use crate::generator::{ContentGenerator, GeminiClient, MockGenerator};
use crate::models::Credential;
use crate::session::{BrowserLauncher, ChromiumLauncher, ScriptedBehavior, ScriptedLauncher, SessionSettings};
use crate::storage::{Collaborators, MemoryStore};
use crate::utils::Clock;

/// How a run reaches the outside world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Real generation, real browser, persisted results
    #[default]
    Live,
    /// Simulated generation and publishing; nothing persisted or sent
    DryRun,
}

impl RunMode {
    pub fn is_dry_run(self) -> bool {
        self == Self::DryRun
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::DryRun => write!(f, "dry run"),
        }
    }
}

/// Build a runner for `mode` from `config`
///
/// `collaborators` are the configured stores. In [`RunMode::DryRun`] they are
/// only read, and `settings.session` is replaced with immediate timing.
pub async fn assemble(
    config: &Config,
    collaborators: Collaborators,
    credentials: Vec<Credential>,
    clock: Arc<dyn Clock>,
    mode: RunMode,
    mut settings: RunSettings,
) -> Result<Runner> {
    let file_usage = JsonFileUsageStore::new(&config.storage.usage_path);
    let daily_limit = config.generator.daily_limit;

    let collaborators = match mode {
        RunMode::Live => collaborators,
        RunMode::DryRun => {
            let memory = Arc::new(MemoryStore::snapshot(&collaborators, clock.clone()).await?);
            Collaborators::from_backend(memory.clone(), memory)
        }
    };
    let usage: Arc<dyn UsageStore> = match mode {
        RunMode::Live => Arc::new(file_usage),
        RunMode::DryRun => Arc::new(MemoryUsageStore::with_entries(file_usage.load().await?)),
    };
    let generator: Arc<dyn ContentGenerator> = match mode {
        RunMode::Live => Arc::new(GeminiClient::new(&config.generator)?),
        RunMode::DryRun => Arc::new(MockGenerator::new()),
    };
    let launcher: Arc<dyn BrowserLauncher> = match mode {
        RunMode::Live => Arc::new(ChromiumLauncher::new(&config.browser)),
        RunMode::DryRun => {
            settings.session = SessionSettings::immediate();
            Arc::new(ScriptedLauncher::new(
                ScriptedBehavior::default(),
                settings.selectors.clone(),
            ))
        }
    };

    let selector = CredentialSelector::load(credentials, usage, clock, daily_limit).await?;
    info!(
        mode = %mode,
        credentials = selector.len(),
        daily_limit,
        "Run assembled"
    );

    Ok(Runner::new(
        collaborators,
        generator,
        Arc::new(selector),
        launcher,
        settings,
    ))
}
