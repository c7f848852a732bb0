//! Chromium driver over the DevTools protocol
//!
//! Each account gets its own Chromium process with a throwaway profile
//! directory. The protocol handler runs in a spawned task for the lifetime of
//! the browser.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::driver::{AccountBrowser, AutomationDriver, BrowserLauncher};
use crate::config::BrowserConfig;
use crate::error::{Error, Result};
use crate::models::Account;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

fn js_string(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Launches one headless Chromium per account
pub struct ChromiumLauncher {
    headless: bool,
    executable: Option<PathBuf>,
    navigation_timeout: Duration,
    profile_root: PathBuf,
}

impl ChromiumLauncher {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            headless: config.headless,
            executable: config.executable.clone(),
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            profile_root: std::env::temp_dir().join("autopost-profiles"),
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, account: &Account) -> Result<Box<dyn AccountBrowser>> {
        let profile_dir = self.profile_root.join(format!(
            "{}-{}",
            crate::utils::normalize_whitespace(&account.username).replace(['/', '\\', ' '], "_"),
            uuid::Uuid::new_v4()
        ));

        let mut builder = CdpBrowserConfig::builder()
            .user_data_dir(&profile_dir)
            .request_timeout(self.navigation_timeout);
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(Error::Browser)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(Error::browser)?;
        let username = account.username.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(account = %username, error = %e, "DevTools handler error");
                }
            }
        });

        info!(account = %account.username, headless = self.headless, "Browser launched");
        Ok(Box::new(ChromiumBrowser {
            browser: tokio::sync::Mutex::new(browser),
            handler_task,
            profile_dir,
            navigation_timeout: self.navigation_timeout,
        }))
    }
}

struct ChromiumBrowser {
    browser: tokio::sync::Mutex<Browser>,
    handler_task: JoinHandle<()>,
    profile_dir: PathBuf,
    navigation_timeout: Duration,
}

#[async_trait]
impl AccountBrowser for ChromiumBrowser {
    async fn open_page(&self) -> Result<Box<dyn AutomationDriver>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(Error::browser)?;
        Ok(Box::new(ChromiumDriver {
            page,
            navigation_timeout: self.navigation_timeout,
        }))
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "Graceful browser close failed, killing process");
            if let Some(Err(e)) = browser.kill().await {
                warn!(error = %e, "Failed to kill browser process");
            }
        }
        match browser.wait().await {
            Ok(status) => debug!(status = ?status, "Browser process exited"),
            Err(e) => warn!(error = %e, "Failed to wait for browser process"),
        }
        self.handler_task.abort();

        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            debug!(path = %self.profile_dir.display(), error = %e, "Profile directory not removed");
        }
        Ok(())
    }
}

struct ChromiumDriver {
    page: Page,
    navigation_timeout: Duration,
}

impl ChromiumDriver {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(Error::browser)?
            .into_value::<T>()
            .map_err(Error::browser)
    }
}

#[async_trait]
impl AutomationDriver for ChromiumDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(result) => result.map(|_| ()).map_err(Error::browser),
            Err(_) => Err(Error::Browser(format!("navigation to {url} timed out"))),
        }
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(Error::browser)?
            .unwrap_or_default())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                const rect = el.getBoundingClientRect();
                return !el.disabled && rect.width > 0 && rect.height > 0;
            }})()"#,
            sel = js_string(selector)?
        );

        let poll = async {
            loop {
                if self.eval::<bool>(script.clone()).await.unwrap_or(false) {
                    return;
                }
                tokio::time::sleep(READY_POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| Error::Browser(format!("timed out waiting for {selector}")))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page
            .find_element(selector)
            .await
            .map_err(Error::browser)?
            .click()
            .await
            .map_err(Error::browser)?;
        Ok(())
    }

    async fn click_by_text(&self, selector: &str, text: &str) -> Result<bool> {
        let script = format!(
            r#"(() => {{
                for (const el of document.querySelectorAll({sel})) {{
                    if (el.textContent.trim() === {text}) {{
                        (el.closest('button') || el).click();
                        return true;
                    }}
                }}
                return false;
            }})()"#,
            sel = js_string(selector)?,
            text = js_string(text)?
        );
        self.eval(script).await
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(Error::browser)?;
        element.focus().await.map_err(Error::browser)?;
        element.type_str(text).await.map_err(Error::browser)?;
        Ok(())
    }

    async fn set_value(&self, selector: &str, value: &str) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.focus();
                el.value = {value};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(selector)?,
            value = js_string(value)?
        );
        if self.eval::<bool>(script).await? {
            Ok(())
        } else {
            Err(Error::Browser(format!("no element matches {selector}")))
        }
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
            Ok(result) => result.map(|_| ()).map_err(Error::browser),
            Err(_) => Err(Error::Browser("navigation wait timed out".into())),
        }
    }

    async fn read_value(&self, selector: &str) -> Result<String> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); return el ? String(el.value ?? '') : ''; }})()",
            sel = js_string(selector)?
        );
        self.eval(script).await
    }

    async fn close(&self) -> Result<()> {
        self.page.clone().close().await.map_err(Error::browser)
    }
}
