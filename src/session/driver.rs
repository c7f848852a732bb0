//! Automation surface abstraction
//!
//! The publishing state machine talks to the browser only through these
//! traits, so it can be driven by Chromium in production and by a scripted
//! fake in dry runs and tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Account;

/// One browser tab
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Navigate to `url` and wait for the load to finish
    async fn goto(&self, url: &str) -> Result<()>;

    /// Current location of the tab
    async fn current_url(&self) -> Result<String>;

    /// Wait up to `timeout` for `selector` to be visible and enabled
    ///
    /// A single readiness attempt; retries are up to the caller.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Click the first element matching `selector`
    async fn click(&self, selector: &str) -> Result<()>;

    /// Click the closest button of the first `selector` match whose trimmed
    /// text equals `text`; `false` when no element matched
    async fn click_by_text(&self, selector: &str, text: &str) -> Result<bool>;

    /// Focus `selector` and type `text` keystroke by keystroke
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// Assign `value` to a form field and fire its `input` event
    async fn set_value(&self, selector: &str, value: &str) -> Result<()>;

    /// Wait for the next navigation to complete
    async fn wait_for_navigation(&self, timeout: Duration) -> Result<()>;

    /// Current `value` of a form field
    async fn read_value(&self, selector: &str) -> Result<String>;

    /// Close the tab
    async fn close(&self) -> Result<()>;
}

/// A browser process dedicated to one account
#[async_trait]
pub trait AccountBrowser: Send + Sync {
    /// Open a fresh tab
    async fn open_page(&self) -> Result<Box<dyn AutomationDriver>>;

    /// Terminate the browser process
    async fn close(&self) -> Result<()>;
}

/// Starts one browser per account
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a browser for `account`; never shared with other accounts
    async fn launch(&self, account: &Account) -> Result<Box<dyn AccountBrowser>>;
}
