//! Run orchestration
//!
//! A run computes each account's remaining goal, then works eligible
//! accounts in parallel (at most `account_concurrency` at once). Each account
//! worker owns one browser and loops: check its remaining goal, claim a batch
//! of unconsumed keywords, and run up to `keyword_concurrency` keyword tasks
//! on it. A keyword task reserves a credential, generates content, publishes it
//! through a [`PublishingSession`] and, on success, records progress and
//! consumes the keyword.
//!
//! Two tokens control shutdown. `halt` only stops new dispatch (goal reached,
//! quota exhausted); `cancel` also aborts every in-flight task at its next
//! suspension point. Either way the final progress flush still runs.

pub mod assemble;
pub mod claims;
pub mod limiter;

pub use assemble::{assemble, RunMode};
pub use claims::KeywordClaims;
pub use limiter::{run_bounded, ConcurrencyLimiter};

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::credentials::CredentialSelector;
use crate::error::{Error, Result};
use crate::generator::{compose_with_backlinks, filter_content, ContentGenerator};
use crate::models::{Account, GeneratedContent, PublishResult, RunSummary, RunTarget, StopReason};
use crate::progress::ProgressRecorder;
use crate::session::{AccountBrowser, BrowserLauncher, EditorSelectors, PublishingSession, SessionSettings};
use crate::storage::Collaborators;
use crate::termination::TerminationGovernor;
use crate::utils::{host_of, RetryPolicy};

// ============================================================================
// Settings
// ============================================================================

/// Everything a run needs besides its collaborators
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Accounts worked at once
    pub account_concurrency: usize,
    /// Keyword tasks in flight per account
    pub keyword_concurrency: usize,
    /// Keywords claimed per dispatch cycle
    pub keyword_batch_size: usize,
    /// Pending successes that trigger a flush
    pub flush_threshold: usize,
    /// Goal used when the settings source has none
    pub default_goal: u32,
    /// Goal that overrides the settings source
    pub goal_override: Option<u32>,
    /// Failed attempts per keyword before it is skipped for the run
    pub max_keyword_attempts: u32,
    /// Recent URLs kept per account for backlinks
    pub recent_url_window: usize,
    /// Token passed with progress upserts
    pub auth_token: Option<String>,
    /// Retry policy for generation calls
    pub retry: RetryPolicy,
    /// Browser interaction timing
    pub session: SessionSettings,
    /// Editor element selectors
    pub selectors: EditorSelectors,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            account_concurrency: config.runner.account_concurrency,
            keyword_concurrency: config.runner.keyword_concurrency,
            keyword_batch_size: config.runner.keyword_batch_size,
            flush_threshold: config.runner.flush_threshold,
            default_goal: config.runner.default_goal,
            goal_override: None,
            max_keyword_attempts: config.runner.max_keyword_attempts,
            recent_url_window: config.runner.recent_url_window,
            auth_token: config.api.api_key.clone(),
            retry: RetryPolicy::new(
                config.generator.max_attempts,
                Duration::from_millis(config.generator.retry_unit_ms),
            ),
            session: SessionSettings::from_config(&config.browser),
            selectors: EditorSelectors::default(),
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// ============================================================================
// Runner
// ============================================================================

/// A configured run, not yet started
pub struct Runner {
    collaborators: Collaborators,
    generator: Arc<dyn ContentGenerator>,
    credentials: Arc<CredentialSelector>,
    launcher: Arc<dyn BrowserLauncher>,
    settings: RunSettings,
}

impl Runner {
    pub fn new(
        collaborators: Collaborators,
        generator: Arc<dyn ContentGenerator>,
        credentials: Arc<CredentialSelector>,
        launcher: Arc<dyn BrowserLauncher>,
        settings: RunSettings,
    ) -> Self {
        Self {
            collaborators,
            generator,
            credentials,
            launcher,
            settings,
        }
    }

    /// Spawn the run on the current runtime
    pub fn start(self) -> RunHandle {
        let run_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let span = info_span!("run", run_id = %run_id);
        let join = tokio::spawn(execute(self, run_id.clone(), cancel.clone()).instrument(span));
        RunHandle {
            run_id,
            cancel,
            join,
        }
    }

    /// Start the run and wait for its summary
    pub async fn run(self) -> Result<RunSummary> {
        self.start().wait().await
    }
}

/// Control surface of a started run
pub struct RunHandle {
    run_id: String,
    cancel: CancellationToken,
    join: JoinHandle<Result<RunSummary>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Abort every in-flight task and close all browsers
    ///
    /// There is no drain: a session interrupted mid-publish leaves its keyword
    /// unconsumed. Progress counted so far is still flushed.
    pub fn stop(&self) {
        info!(run_id = %self.run_id, "Stop requested");
        self.cancel.cancel();
    }

    /// Token cancelled by [`RunHandle::stop`]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to end
    pub async fn wait(self) -> Result<RunSummary> {
        self.join
            .await
            .map_err(|e| Error::other(format!("run task failed: {e}")))?
    }
}

// ============================================================================
// Execution
// ============================================================================

#[derive(Debug, Default)]
struct RunStats {
    sessions_started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

type RecentUrls = Arc<Mutex<VecDeque<String>>>;

struct RunContext {
    collaborators: Collaborators,
    generator: Arc<dyn ContentGenerator>,
    credentials: Arc<CredentialSelector>,
    launcher: Arc<dyn BrowserLauncher>,
    settings: RunSettings,
    recorder: Arc<ProgressRecorder>,
    governor: TerminationGovernor,
    claims: KeywordClaims,
    stats: RunStats,
    cancel: CancellationToken,
    halt: CancellationToken,
    halt_reason: Mutex<Option<StopReason>>,
    run_id: String,
}

async fn execute(runner: Runner, run_id: String, cancel: CancellationToken) -> Result<RunSummary> {
    let Runner {
        collaborators,
        generator,
        credentials,
        launcher,
        settings,
    } = runner;

    let goal = resolve_goal(&collaborators, &settings).await;

    let accounts = collaborators.accounts.fetch_accounts().await?;
    let usernames: Vec<String> = accounts.iter().map(|a| a.username.clone()).collect();
    if let Err(e) = collaborators.progress.ensure_today(&usernames).await {
        warn!(error = %e, "Could not initialise today's progress records");
    }

    let recorder = Arc::new(ProgressRecorder::new(
        Arc::clone(&collaborators.progress),
        settings.flush_threshold,
        settings.auth_token.clone(),
    ));
    let governor = TerminationGovernor::new(
        Arc::clone(&collaborators.progress),
        Arc::clone(&recorder),
        goal,
        usernames.clone(),
    );

    let remaining = governor.remaining_all().await?;
    let eligible: Vec<Account> = accounts
        .into_iter()
        .filter(|a| remaining.get(&a.username).copied().unwrap_or(0) > 0)
        .collect();
    let target = RunTarget {
        per_account_goal: goal,
        global_goal: eligible
            .iter()
            .map(|a| remaining.get(&a.username).copied().unwrap_or(0))
            .sum(),
    };

    if credentials.is_empty() {
        warn!("No generation credentials configured");
    }
    info!(
        accounts = usernames.len(),
        eligible = eligible.len(),
        per_account_goal = target.per_account_goal,
        global_goal = target.global_goal,
        "Run starting"
    );

    let ctx = Arc::new(RunContext {
        claims: KeywordClaims::new(settings.max_keyword_attempts),
        halt: cancel.child_token(),
        cancel: cancel.clone(),
        collaborators,
        generator,
        credentials,
        launcher,
        settings,
        recorder,
        governor,
        stats: RunStats::default(),
        halt_reason: Mutex::new(None),
        run_id,
    });

    if eligible.is_empty() {
        let reason = if usernames.is_empty() {
            StopReason::NothingToDo
        } else {
            StopReason::GoalReached
        };
        let summary = ctx.summary(target, reason);
        info!(stop_reason = %reason, "Nothing to dispatch");
        return Ok(summary);
    }

    let workers = eligible.into_iter().map(|account| {
        let ctx = Arc::clone(&ctx);
        async move { ctx.work_account(account).await }
    });
    for result in run_bounded(workers, ctx.settings.account_concurrency).await {
        if let Err(e) = result {
            error!(error = %e, "Account worker ended abnormally");
        }
    }

    match ctx.recorder.flush().await {
        Ok(flushed) => debug!(flushed, "Final progress flush complete"),
        Err(e) => warn!(
            error = %e,
            pending = ctx.recorder.pending_total(),
            "Final progress flush failed"
        ),
    }

    let reason = ctx.stop_reason().await;
    let summary = ctx.summary(target, reason);
    info!(
        stop_reason = %summary.stop_reason,
        sessions = summary.sessions_started,
        succeeded = summary.succeeded,
        failed = summary.failed,
        flushed = summary.flushed,
        pending_unflushed = summary.pending_unflushed,
        "Run finished"
    );
    Ok(summary)
}

async fn resolve_goal(collaborators: &Collaborators, settings: &RunSettings) -> u32 {
    if let Some(goal) = settings.goal_override {
        return goal;
    }
    match collaborators.settings.fetch_goal().await {
        Ok(Some(goal)) => goal,
        Ok(None) => {
            info!(default = settings.default_goal, "No goal configured, using default");
            settings.default_goal
        }
        Err(e) => {
            warn!(error = %e, default = settings.default_goal, "Could not read goal, using default");
            settings.default_goal
        }
    }
}

impl RunContext {
    /// Stop dispatching new work; in-flight tasks finish
    fn halt(&self, reason: StopReason) {
        let first = match self.halt_reason.lock() {
            Ok(mut slot) if slot.is_none() => {
                *slot = Some(reason);
                true
            }
            _ => false,
        };
        if first {
            info!(%reason, "Dispatch halted");
        }
        self.halt.cancel();
    }

    async fn until_halted<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            _ = self.halt.cancelled() => None,
            output = future => Some(output),
        }
    }

    async fn stop_reason(&self) -> StopReason {
        if self.cancel.is_cancelled() {
            return StopReason::Cancelled;
        }
        let recorded = self.halt_reason.lock().ok().and_then(|r| *r);
        if let Some(reason) = recorded {
            return reason;
        }
        if self.governor.should_stop_globally().await {
            StopReason::GoalReached
        } else {
            StopReason::KeywordsExhausted
        }
    }

    fn summary(&self, target: RunTarget, stop_reason: StopReason) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            target,
            sessions_started: self.stats.sessions_started.load(Ordering::SeqCst),
            succeeded: self.stats.succeeded.load(Ordering::SeqCst),
            failed: self.stats.failed.load(Ordering::SeqCst),
            flushed: self.recorder.flushed_total(),
            pending_unflushed: self.recorder.pending_total() as u64,
            stop_reason,
        }
    }

    // ------------------------------------------------------------------------
    // Account worker
    // ------------------------------------------------------------------------

    async fn work_account(self: Arc<Self>, account: Account) {
        let span = info_span!(
            "account",
            account = %account.username,
            site = %host_of(&account.editor_url)
        );
        async move {
            let launched = tokio::select! {
                _ = self.cancel.cancelled() => return,
                launched = self.launcher.launch(&account) => launched,
            };
            let browser: Arc<dyn AccountBrowser> = match launched {
                Ok(browser) => Arc::from(browser),
                Err(e) => {
                    error!(error = %e, "Browser launch failed");
                    return;
                }
            };

            let recent: RecentUrls = Arc::new(Mutex::new(VecDeque::new()));
            Arc::clone(&self)
                .dispatch(&account, Arc::clone(&browser), recent)
                .await;

            if let Err(e) = browser.close().await {
                warn!(error = %e, "Browser close failed");
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch(self: Arc<Self>, account: &Account, browser: Arc<dyn AccountBrowser>, recent: RecentUrls) {
        loop {
            if self.halt.is_cancelled() {
                break;
            }

            let Some(remaining) = self.until_halted(self.governor.remaining(&account.username)).await else {
                break;
            };
            if remaining == 0 {
                info!("Account reached its goal");
                break;
            }

            let pool = match self.until_halted(self.collaborators.keywords.fetch_unconsumed()).await {
                None => break,
                Some(Ok(pool)) => pool,
                Some(Err(e)) => {
                    warn!(error = %e, "Keyword fetch failed");
                    break;
                }
            };

            let limit = self.settings.keyword_batch_size.min(remaining as usize);
            let batch = self.claims.claim(&pool, limit);
            if batch.is_empty() {
                info!("No keywords left to claim");
                break;
            }
            debug!(claimed = batch.len(), remaining, "Keyword batch claimed");

            let tasks = batch.into_iter().map(|keyword| {
                let ctx = Arc::clone(&self);
                let account = account.clone();
                let browser = Arc::clone(&browser);
                let recent = Arc::clone(&recent);
                async move { ctx.keyword_task(account, browser, recent, keyword).await }
            });
            for result in run_bounded(tasks, self.settings.keyword_concurrency).await {
                if let Err(e) = result {
                    error!(error = %e, "Keyword task ended abnormally");
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Keyword task
    // ------------------------------------------------------------------------

    async fn keyword_task(
        self: Arc<Self>,
        account: Account,
        browser: Arc<dyn AccountBrowser>,
        recent: RecentUrls,
        keyword: String,
    ) {
        let span = info_span!("keyword", keyword = %keyword);
        async {
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => None,
                result = self.publish_keyword(&account, browser.as_ref(), &recent, &keyword) => Some(result),
            };

            match outcome {
                None => {
                    self.claims.release(&keyword);
                    debug!("Keyword task cancelled");
                }
                Some(Ok(result)) => self.on_success(&recent, result).await,
                Some(Err(e)) => self.on_failure(&keyword, e),
            }

            if !self.halt.is_cancelled() && self.governor.should_stop_globally().await {
                self.halt(StopReason::GoalReached);
            }
        }
        .instrument(span)
        .await
    }

    async fn publish_keyword(
        &self,
        account: &Account,
        browser: &dyn AccountBrowser,
        recent: &RecentUrls,
        keyword: &str,
    ) -> Result<PublishResult> {
        let credentials = &self.credentials;
        let generator = &self.generator;
        let generated = self
            .settings
            .retry
            .run(move |attempt| async move {
                let credential = credentials.reserve().await?;
                debug!(attempt, credential = %credential.id, "Generating content");
                generator.generate(keyword, &credential).await
            })
            .await;

        let generated = match generated {
            Ok(generated) => generated,
            Err(e) => {
                if matches!(e.root(), Error::QuotaExhausted { .. }) {
                    self.halt(StopReason::QuotaExhausted);
                }
                return Err(e);
            }
        };
        let filtered = GeneratedContent {
            title: generated.title,
            content: filter_content(&generated.content),
        };
        if !filtered.is_complete() {
            return Err(Error::ContentGeneration(format!(
                "empty title or body for '{keyword}'"
            )));
        }

        let backlinks: Vec<String> = recent
            .lock()
            .map(|urls| urls.iter().cloned().collect())
            .unwrap_or_default();
        let content = GeneratedContent {
            content: compose_with_backlinks(&filtered.content, &backlinks),
            ..filtered
        };

        let driver = browser.open_page().await?;
        self.stats.sessions_started.fetch_add(1, Ordering::SeqCst);

        let mut session =
            PublishingSession::new(&self.settings.session, &self.settings.selectors, account, &content);
        let outcome = session.run(driver.as_ref()).await;
        if let Err(e) = driver.close().await {
            debug!(error = %e, "Page close failed");
        }
        let published_url = outcome?;

        Ok(PublishResult {
            account: account.username.clone(),
            keyword: keyword.to_string(),
            title: content.title,
            published_url,
            timestamp: Utc::now(),
        })
    }

    async fn on_success(&self, recent: &RecentUrls, result: PublishResult) {
        self.stats.succeeded.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut urls) = recent.lock() {
            urls.push_front(result.published_url.clone());
            urls.truncate(self.settings.recent_url_window);
        }

        if let Err(e) = self.collaborators.publish_log.append(&result).await {
            warn!(error = %e, "Publish log append failed");
        }
        self.recorder.record_success(&result.account).await;

        match self.collaborators.keywords.mark_consumed(&result.keyword).await {
            Ok(true) => {}
            Ok(false) => warn!("Keyword was already consumed"),
            Err(e) => warn!(error = %e, "Marking keyword consumed failed"),
        }
        self.claims.complete(&result.keyword);

        info!(url = %result.published_url, title = %result.title, "Post published");
    }

    fn on_failure(&self, keyword: &str, error: Error) {
        self.stats.failed.fetch_add(1, Ordering::SeqCst);
        let failures = self.claims.release_failed(keyword);
        warn!(
            failures,
            category = error.root().category().as_str(),
            recoverable = error.is_recoverable(),
            error = %error,
            "Keyword task failed"
        );
    }
}
