//! Scripted automation surface
//!
//! An in-process stand-in for the block editor. It records every interaction
//! and hands out fake post URLs, which makes it suitable both for
//! `run --dry-run` and for exercising the state machine in tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::driver::{AccountBrowser, AutomationDriver, BrowserLauncher};
use super::selectors::EditorSelectors;
use crate::error::{Error, Result};
use crate::models::Account;

/// How the fake editor behaves
#[derive(Debug, Default)]
pub struct ScriptedBehavior {
    /// Redirect to the login page until the account signs in
    pub login_required: bool,
    /// Keep the login page after submit
    pub reject_login: bool,
    /// Selectors that never become ready
    pub missing_selectors: HashSet<String>,
    /// Titles whose published URL reads back empty
    pub blank_url_titles: HashSet<String>,
    /// Latency added to every readiness wait
    pub action_delay: Duration,
    next_post_id: AtomicU64,
}

impl ScriptedBehavior {
    /// Send every account through the login page once
    pub fn requires_login(mut self) -> Self {
        self.login_required = true;
        self
    }

    /// Require a login that never succeeds
    pub fn rejecting_login(mut self) -> Self {
        self.login_required = true;
        self.reject_login = true;
        self
    }

    /// Make `selector` never ready
    pub fn missing(mut self, selector: impl Into<String>) -> Self {
        self.missing_selectors.insert(selector.into());
        self
    }

    /// Read back an empty URL after publishing a post titled `title`
    pub fn blank_url_for(mut self, title: impl Into<String>) -> Self {
        self.blank_url_titles.insert(title.into());
        self
    }

    /// Add latency to every readiness wait
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.action_delay = delay;
        self
    }

    fn next_post_id(&self) -> u64 {
        self.next_post_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Debug, Default)]
struct PageState {
    current_url: String,
    editor_url: String,
    values: HashMap<String, String>,
    clicks: Vec<String>,
    waits: HashMap<String, u32>,
    closed: bool,
}

/// One fake tab
pub struct ScriptedDriver {
    behavior: Arc<ScriptedBehavior>,
    selectors: EditorSelectors,
    logged_in: Arc<AtomicBool>,
    open_pages: Option<Arc<AtomicUsize>>,
    state: Mutex<PageState>,
}

impl ScriptedDriver {
    /// Standalone tab with its own login state
    pub fn new(behavior: Arc<ScriptedBehavior>, selectors: EditorSelectors) -> Self {
        Self {
            behavior,
            selectors,
            logged_in: Arc::new(AtomicBool::new(false)),
            open_pages: None,
            state: Mutex::new(PageState::default()),
        }
    }

    /// Current value of a field
    pub fn value_of(&self, selector: &str) -> Option<String> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.values.get(selector).cloned())
    }

    /// Whether `selector` was clicked at least once
    pub fn clicked(&self, selector: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.clicks.iter().any(|c| c == selector))
            .unwrap_or(false)
    }

    /// Number of readiness waits issued for `selector`
    pub fn wait_calls(&self, selector: &str) -> u32 {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.waits.get(selector).copied())
            .unwrap_or(0)
    }

    fn origin(url: &str) -> String {
        Url::parse(url)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|_| url.trim_end_matches('/').to_string())
    }
}

#[async_trait]
impl AutomationDriver for ScriptedDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock()?;
        state.editor_url = url.to_string();
        state.current_url = if self.behavior.login_required && !self.logged_in.load(Ordering::SeqCst)
        {
            format!("{}/wp-login.php?redirect_to={url}", Self::origin(url))
        } else {
            url.to_string()
        };
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock()?.current_url.clone())
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<()> {
        *self
            .state
            .lock()?
            .waits
            .entry(selector.to_string())
            .or_insert(0) += 1;

        if !self.behavior.action_delay.is_zero() {
            tokio::time::sleep(self.behavior.action_delay).await;
        }
        if self.behavior.missing_selectors.contains(selector) {
            return Err(Error::Browser(format!("timed out waiting for {selector}")));
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut state = self.state.lock()?;
        state.clicks.push(selector.to_string());

        if selector == self.selectors.login_submit && !self.behavior.reject_login {
            self.logged_in.store(true, Ordering::SeqCst);
            state.current_url = state.editor_url.clone();
        }

        if selector == self.selectors.copy_url_button {
            let title = state
                .values
                .get(&self.selectors.title_field)
                .cloned()
                .unwrap_or_default();
            let url = if self.behavior.blank_url_titles.contains(&title) {
                String::new()
            } else {
                format!(
                    "{}/?p={}",
                    Self::origin(&state.editor_url),
                    self.behavior.next_post_id()
                )
            };
            state
                .values
                .insert(self.selectors.published_url_field.clone(), url);
        }
        Ok(())
    }

    async fn click_by_text(&self, selector: &str, text: &str) -> Result<bool> {
        let mut state = self.state.lock()?;
        state.clicks.push(format!("{selector}:{text}"));
        Ok(text == self.selectors.raw_mode_label)
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        self.state
            .lock()?
            .values
            .entry(selector.to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn set_value(&self, selector: &str, value: &str) -> Result<()> {
        self.state
            .lock()?
            .values
            .insert(selector.to_string(), value.to_string());
        Ok(())
    }

    async fn wait_for_navigation(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn read_value(&self, selector: &str) -> Result<String> {
        Ok(self
            .state
            .lock()?
            .values
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        if !state.closed {
            state.closed = true;
            if let Some(open) = &self.open_pages {
                open.fetch_sub(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

/// Counters shared by every browser of a [`ScriptedLauncher`]
#[derive(Debug, Default)]
pub struct LaunchStats {
    /// Browsers launched
    pub launched: AtomicUsize,
    /// Browsers closed
    pub closed: AtomicUsize,
    /// Tabs opened
    pub pages_opened: AtomicUsize,
    /// Highest number of simultaneously open tabs seen in one browser
    pub max_pages_per_browser: AtomicUsize,
}

struct ScriptedBrowser {
    behavior: Arc<ScriptedBehavior>,
    selectors: EditorSelectors,
    logged_in: Arc<AtomicBool>,
    open_pages: Arc<AtomicUsize>,
    stats: Arc<LaunchStats>,
}

#[async_trait]
impl AccountBrowser for ScriptedBrowser {
    async fn open_page(&self) -> Result<Box<dyn AutomationDriver>> {
        let now_open = self.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.pages_opened.fetch_add(1, Ordering::SeqCst);
        self.stats
            .max_pages_per_browser
            .fetch_max(now_open, Ordering::SeqCst);

        Ok(Box::new(ScriptedDriver {
            behavior: Arc::clone(&self.behavior),
            selectors: self.selectors.clone(),
            logged_in: Arc::clone(&self.logged_in),
            open_pages: Some(Arc::clone(&self.open_pages)),
            state: Mutex::new(PageState::default()),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launches scripted browsers
pub struct ScriptedLauncher {
    behavior: Arc<ScriptedBehavior>,
    selectors: EditorSelectors,
    stats: Arc<LaunchStats>,
}

impl ScriptedLauncher {
    pub fn new(behavior: ScriptedBehavior, selectors: EditorSelectors) -> Self {
        Self {
            behavior: Arc::new(behavior),
            selectors,
            stats: Arc::new(LaunchStats::default()),
        }
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<LaunchStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for ScriptedLauncher {
    fn default() -> Self {
        Self::new(ScriptedBehavior::default(), EditorSelectors::default())
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self, _account: &Account) -> Result<Box<dyn AccountBrowser>> {
        self.stats.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedBrowser {
            behavior: Arc::clone(&self.behavior),
            selectors: self.selectors.clone(),
            logged_in: Arc::new(AtomicBool::new(false)),
            open_pages: Arc::new(AtomicUsize::new(0)),
            stats: Arc::clone(&self.stats),
        }))
    }
}
