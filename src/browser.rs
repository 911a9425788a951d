//! Owned, lazily launched Headless Chrome shared by every search.
//!
//! One browser process per service; each render opens its own tab so
//! concurrent lookups never queue behind a single session. `shutdown` is
//! called from `main` once the server has stopped.

use anyhow::{anyhow, Result};
use headless_chrome::protocol::cdp::Emulation::{SetLocaleOverride, SetTimezoneOverride};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::fetch::random_user_agent;

/// Keeps Chrome alive between searches; the default would reap it after 30s.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Something that can turn a URL into rendered DOM. Blocking.
pub trait PageRenderer: Send + Sync {
    fn render(&self, url: &str, ready_selector: &str, timeout: Duration) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct LocaleProfile {
    /// BCP-47 locale, e.g. `en-AU`.
    pub locale: String,
    pub accept_language: String,
    pub timezone: String,
}

pub struct BrowserManager {
    browser: Mutex<Option<Arc<Browser>>>,
    profile: LocaleProfile,
}

impl BrowserManager {
    pub fn new(profile: LocaleProfile) -> Self {
        Self {
            browser: Mutex::new(None),
            profile,
        }
    }

    /// Drop the browser, terminating the Chrome process.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.browser.lock() {
            if guard.take().is_some() {
                tracing::info!("🧹 Headless browser shut down");
            }
        }
    }

    fn open_tab(&self) -> Result<Arc<Tab>> {
        let mut guard = self
            .browser
            .lock()
            .map_err(|_| anyhow!("browser lock poisoned"))?;

        if let Some(browser) = guard.as_ref() {
            match browser.new_tab() {
                Ok(tab) => return self.prepare_tab(tab),
                Err(e) => {
                    tracing::warn!("⚠️ Browser unusable ({}), relaunching", e);
                    *guard = None;
                }
            }
        }

        let browser = Arc::new(self.launch()?);
        let tab = browser.new_tab()?;
        *guard = Some(browser);
        self.prepare_tab(tab)
    }

    fn launch(&self) -> Result<Browser> {
        let ua_arg = format!("--user-agent={}", random_user_agent());
        let lang_arg = format!("--lang={}", self.profile.locale);
        let args = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-infobars"),
            OsStr::new("--incognito"),
            OsStr::new("--headless=new"),
            OsStr::new(&ua_arg),
            OsStr::new(&lang_arg),
        ];

        tracing::info!("🚀 Launching headless browser ({})", self.profile.locale);
        Browser::new(LaunchOptions {
            headless: false, // new headless mode via args
            window_size: Some((1920, 1080)),
            idle_browser_timeout: IDLE_BROWSER_TIMEOUT,
            args,
            ..Default::default()
        })
    }

    /// Apply the locale profile; a tab that cannot be prepared is closed
    /// rather than left open in the shared browser.
    fn prepare_tab(&self, tab: Arc<Tab>) -> Result<Arc<Tab>> {
        setup_or_close(
            tab,
            |tab| self.apply_profile(tab),
            |tab| {
                if let Err(e) = tab.close(true) {
                    tracing::debug!("Failed to close unprepared tab: {}", e);
                }
            },
        )
    }

    fn apply_profile(&self, tab: &Tab) -> Result<()> {
        tab.set_user_agent(
            random_user_agent(),
            Some(&self.profile.accept_language),
            None,
        )?;
        tab.call_method(SetLocaleOverride {
            locale: Some(self.profile.locale.clone()),
        })?;
        tab.call_method(SetTimezoneOverride {
            timezone_id: self.profile.timezone.clone(),
        })?;
        Ok(())
    }
}

fn setup_or_close<T>(
    resource: T,
    setup: impl FnOnce(&T) -> Result<()>,
    close: impl FnOnce(&T),
) -> Result<T> {
    match setup(&resource) {
        Ok(()) => Ok(resource),
        Err(e) => {
            close(&resource);
            Err(e)
        }
    }
}

impl PageRenderer for BrowserManager {
    /// Navigate a fresh tab to `url`, wait up to `timeout` for `ready_selector`
    /// and return the rendered DOM. Blocking; run it on a blocking thread.
    fn render(&self, url: &str, ready_selector: &str, timeout: Duration) -> Result<String> {
        let tab = self.open_tab()?;
        let result = (|| {
            tab.set_default_timeout(timeout);
            tab.navigate_to(url)?;
            if let Err(e) = tab.wait_for_element_with_custom_timeout(ready_selector, timeout) {
                // No-result and challenge pages never grow the selector; the
                // caller still gets the DOM to inspect.
                tracing::debug!("Selector {} not found on {}: {}", ready_selector, url, e);
            }
            tab.get_content()
        })();

        if let Err(e) = tab.close(true) {
            tracing::debug!("Failed to close tab: {}", e);
        }
        result
    }
}

impl Drop for BrowserManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_failed_setup_closes_resource() {
        let closed = Cell::new(0);
        let result = setup_or_close(
            "tab",
            |_| Err(anyhow!("timezone override rejected")),
            |_| closed.set(closed.get() + 1),
        );
        assert!(result.is_err());
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn test_successful_setup_keeps_resource_open() {
        let closed = Cell::new(0);
        let result = setup_or_close("tab", |_| Ok(()), |_| closed.set(closed.get() + 1));
        assert_eq!(result.unwrap(), "tab");
        assert_eq!(closed.get(), 0);
    }
}
