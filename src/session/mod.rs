//! Publishing session state machine
//!
//! One session publishes one generated post under one account:
//!
//! ```text
//! Start → NavigateToEditor → (LoginIfRequired) → SwitchToRawContentMode
//!       → InjectTitleAndContent → RequestPublish → ConfirmPublish
//!       → ExtractPublishedUrl → Done
//! ```
//!
//! Every state waits for its element with [`wait_until_ready`] (bounded
//! attempts, per-attempt timeout). Any error moves the session to
//! [`SessionState::Aborted`]; the keyword then stays unconsumed.
//!
//! The publish click is never retried. Once `ConfirmPublish` has clicked,
//! a failed navigation wait is logged and the session still tries to read the
//! URL back.

pub mod chromium;
pub mod driver;
pub mod scripted;
pub mod selectors;

pub use chromium::ChromiumLauncher;
pub use driver::{AccountBrowser, AutomationDriver, BrowserLauncher};
pub use scripted::{ScriptedBehavior, ScriptedLauncher};
pub use selectors::EditorSelectors;

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::error::{Error, Result};
use crate::models::{Account, GeneratedContent};

/// Step of a publishing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Start,
    NavigateToEditor,
    LoginIfRequired,
    SwitchToRawContentMode,
    InjectTitleAndContent,
    RequestPublish,
    ConfirmPublish,
    ExtractPublishedUrl,
    Done,
    Aborted,
}

impl SessionState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Timing of browser interactions
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Readiness attempts per element
    pub wait_attempts: u32,
    /// Timeout of one readiness attempt
    pub wait_timeout: Duration,
    /// Pause between readiness attempts
    pub wait_pause: Duration,
    /// Pause after typing into a login field
    pub field_pause: Duration,
    /// Pause after switching the editor mode
    pub mode_switch_pause: Duration,
    /// Pause before reading the published URL
    pub publish_settle: Duration,
    /// Navigation wait timeout
    pub navigation_timeout: Duration,
}

impl SessionSettings {
    /// Settings from the browser section of the configuration
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            wait_attempts: config.wait_attempts.max(1),
            wait_timeout: Duration::from_secs(config.wait_timeout_secs),
            wait_pause: Duration::from_millis(config.wait_retry_pause_ms),
            field_pause: Duration::from_millis(config.field_pause_ms),
            mode_switch_pause: Duration::from_millis(config.field_pause_ms * 2),
            publish_settle: Duration::from_millis(config.publish_settle_ms),
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
        }
    }

    /// No pauses and short timeouts, for scripted drivers
    pub fn immediate() -> Self {
        Self {
            wait_attempts: 3,
            wait_timeout: Duration::from_millis(50),
            wait_pause: Duration::ZERO,
            field_pause: Duration::ZERO,
            mode_switch_pause: Duration::ZERO,
            publish_settle: Duration::ZERO,
            navigation_timeout: Duration::from_millis(50),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&BrowserConfig::default())
    }
}

/// Wait for `selector` with up to `attempts` bounded attempts
///
/// Fails with [`Error::SelectorTimeout`] when every attempt timed out.
pub async fn wait_until_ready(
    driver: &dyn AutomationDriver,
    selector: &str,
    attempts: u32,
    timeout: Duration,
    pause: Duration,
) -> Result<()> {
    for attempt in 1..=attempts {
        match driver.wait_for(selector, timeout).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(selector, attempt, attempts, error = %e, "Element not ready");
                if attempt < attempts && !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }
    Err(Error::SelectorTimeout {
        selector: selector.to_string(),
        attempts,
    })
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// One attempt to publish one post under one account
pub struct PublishingSession<'a> {
    settings: &'a SessionSettings,
    selectors: &'a EditorSelectors,
    account: &'a Account,
    content: &'a GeneratedContent,
    history: Vec<SessionState>,
    published_url: Option<String>,
}

impl<'a> PublishingSession<'a> {
    pub fn new(
        settings: &'a SessionSettings,
        selectors: &'a EditorSelectors,
        account: &'a Account,
        content: &'a GeneratedContent,
    ) -> Self {
        Self {
            settings,
            selectors,
            account,
            content,
            history: Vec::new(),
            published_url: None,
        }
    }

    /// States entered so far, in order
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Drive the session to `Done` and return the published URL
    pub async fn run(&mut self, driver: &dyn AutomationDriver) -> Result<String> {
        let mut state = SessionState::Start;
        loop {
            self.history.push(state);
            if state == SessionState::Done {
                break;
            }

            match self.advance(state, driver).await {
                Ok(next) => {
                    debug!(account = %self.account.username, from = %state, to = %next, "Session transition");
                    state = next;
                }
                Err(e) => {
                    warn!(
                        account = %self.account.username,
                        state = %state,
                        error = %e,
                        "Publishing session aborted"
                    );
                    self.history.push(SessionState::Aborted);
                    return Err(e);
                }
            }
        }

        self.published_url.clone().ok_or(Error::UrlNotFound)
    }

    async fn ready(&self, driver: &dyn AutomationDriver, selector: &str) -> Result<()> {
        wait_until_ready(
            driver,
            selector,
            self.settings.wait_attempts,
            self.settings.wait_timeout,
            self.settings.wait_pause,
        )
        .await
    }

    /// Perform the work of `state` and return the state to enter next
    pub async fn advance(
        &mut self,
        state: SessionState,
        driver: &dyn AutomationDriver,
    ) -> Result<SessionState> {
        let sel = self.selectors;
        match state {
            SessionState::Start => Ok(SessionState::NavigateToEditor),

            SessionState::NavigateToEditor => {
                driver.goto(&self.account.editor_url).await?;
                let location = driver.current_url().await?;
                if sel.is_login_page(&location) {
                    Ok(SessionState::LoginIfRequired)
                } else {
                    Ok(SessionState::SwitchToRawContentMode)
                }
            }

            SessionState::LoginIfRequired => {
                if !self.account.has_credentials() {
                    return Err(Error::Authentication(format!(
                        "missing credentials for account '{}'",
                        self.account.username
                    )));
                }
                info!(account = %self.account.username, "Login page detected, signing in");

                self.ready(driver, &sel.login_username).await?;
                driver
                    .type_text(&sel.login_username, &self.account.username)
                    .await?;
                pause(self.settings.field_pause).await;

                self.ready(driver, &sel.login_password).await?;
                driver
                    .type_text(&sel.login_password, &self.account.password)
                    .await?;
                pause(self.settings.field_pause).await;

                driver.click(&sel.login_submit).await?;
                if let Err(e) = driver
                    .wait_for_navigation(self.settings.navigation_timeout)
                    .await
                {
                    debug!(error = %e, "No navigation after login submit");
                }

                let location = driver.current_url().await?;
                if sel.is_login_page(&location) {
                    return Err(Error::Authentication(format!(
                        "login rejected for account '{}'",
                        self.account.username
                    )));
                }

                driver.goto(&self.account.editor_url).await?;
                Ok(SessionState::SwitchToRawContentMode)
            }

            SessionState::SwitchToRawContentMode => {
                self.ready(driver, &sel.options_button).await?;
                driver.click(&sel.options_button).await?;

                self.ready(driver, &sel.mode_menu_items).await?;
                if !driver
                    .click_by_text(&sel.mode_menu_items, &sel.raw_mode_label)
                    .await?
                {
                    return Err(Error::SelectorTimeout {
                        selector: format!("{} ({})", sel.mode_menu_items, sel.raw_mode_label),
                        attempts: 1,
                    });
                }
                pause(self.settings.mode_switch_pause).await;

                // Close the options menu, then dismiss the mode notice
                driver.click(&sel.options_button).await?;
                self.ready(driver, &sel.mode_exit_button).await?;
                driver.click(&sel.mode_exit_button).await?;
                Ok(SessionState::InjectTitleAndContent)
            }

            SessionState::InjectTitleAndContent => {
                self.ready(driver, &sel.title_field).await?;
                driver.type_text(&sel.title_field, &self.content.title).await?;

                self.ready(driver, &sel.content_field).await?;
                driver
                    .set_value(&sel.content_field, &self.content.content)
                    .await?;
                // A real keystroke so the editor registers the injected value
                driver.type_text(&sel.content_field, ".").await?;
                Ok(SessionState::RequestPublish)
            }

            SessionState::RequestPublish => {
                self.ready(driver, &sel.publish_toggle).await?;
                driver.click(&sel.publish_toggle).await?;
                Ok(SessionState::ConfirmPublish)
            }

            SessionState::ConfirmPublish => {
                self.ready(driver, &sel.publish_confirm).await?;
                driver.click(&sel.publish_confirm).await?;
                if let Err(e) = driver
                    .wait_for_navigation(self.settings.navigation_timeout)
                    .await
                {
                    warn!(
                        account = %self.account.username,
                        error = %e,
                        "Navigation after publish not observed, reading URL anyway"
                    );
                }
                Ok(SessionState::ExtractPublishedUrl)
            }

            SessionState::ExtractPublishedUrl => {
                pause(self.settings.publish_settle).await;
                self.ready(driver, &sel.copy_url_button).await?;
                driver.click(&sel.copy_url_button).await?;

                self.ready(driver, &sel.published_url_field).await?;
                let url = driver.read_value(&sel.published_url_field).await?;
                let url = url.trim();
                if url.is_empty() {
                    return Err(Error::UrlNotFound);
                }
                self.published_url = Some(url.to_string());
                Ok(SessionState::Done)
            }

            SessionState::Done | SessionState::Aborted => Err(Error::other(format!(
                "no transition out of terminal state {state}"
            ))),
        }
    }
}
