use anyhow::{anyhow, Result};
use headless_chrome::{Browser, LaunchOptions};
use std::time::Duration;

use crate::config::FetcherConfig;

/// Capability interface for the heavy rendering tier. Implementations
/// return the fully rendered page HTML; the core logic stays testable
/// with fixture payloads and never needs a browser engine in unit tests.
pub trait PageRenderer: Send + Sync {
    fn render(&self, url: &str) -> Result<String>;
}

/// Consent interstitial buttons, dismissed opportunistically. Absence is
/// never fatal.
const CONSENT_SELECTORS: &[&str] = &[
    r#"button[data-role="accept-consent"]"#,
    r#"button[data-testid="accept-all"]"#,
    "#onetrust-accept-btn-handler",
];

/// Price-bearing elements worth waiting for before reading the DOM.
const PRICE_WAIT_SELECTOR: &str = r#"meta[itemprop="price"], [data-price], .price"#;

/// Renders pages in a headless Chrome instance. Images, remote fonts and
/// background work are disabled at launch to keep renders fast.
pub struct ChromeRenderer {
    browser: Browser,
    user_agent: String,
    render_wait: Duration,
}

impl ChromeRenderer {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false) // needed in containerized environments
            .args(vec![
                std::ffi::OsStr::new("--no-sandbox"),
                std::ffi::OsStr::new("--disable-dev-shm-usage"),
                std::ffi::OsStr::new("--disable-gpu"),
                std::ffi::OsStr::new("--disable-extensions"),
                std::ffi::OsStr::new("--blink-settings=imagesEnabled=false"),
                std::ffi::OsStr::new("--disable-remote-fonts"),
                std::ffi::OsStr::new("--disable-background-timer-throttling"),
                std::ffi::OsStr::new("--disable-backgrounding-occluded-windows"),
                std::ffi::OsStr::new("--disable-renderer-backgrounding"),
            ])
            .build()
            .map_err(|e| anyhow!("Failed to create launch options: {}", e))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        let browser =
            Browser::new(launch_options).map_err(|e| anyhow!("Failed to launch browser: {}", e))?;

        Ok(ChromeRenderer {
            browser,
            user_agent: config.user_agent.clone(),
            render_wait: Duration::from_secs(config.render_wait_secs),
        })
    }
}

impl PageRenderer for ChromeRenderer {
    fn render(&self, url: &str) -> Result<String> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| anyhow!("Failed to create tab: {}", e))?;

        tab.set_user_agent(&self.user_agent, None, None)
            .map_err(|e| anyhow!("Failed to set user agent: {}", e))?;

        tab.navigate_to(url)
            .map_err(|e| anyhow!("Navigation failed: {}", e))?;
        tab.wait_until_navigated()
            .map_err(|e| anyhow!("Page load failed: {}", e))?;

        // Best-effort consent dismissal; a missing button is fine
        for selector in CONSENT_SELECTORS {
            if let Ok(button) = tab.find_element(selector) {
                let _ = button.click();
                break;
            }
        }

        // Bounded wait for price-bearing elements; a timeout just means
        // we read whatever attached so far
        let _ = tab.wait_for_element_with_custom_timeout(PRICE_WAIT_SELECTOR, self.render_wait);

        let html = tab
            .get_content()
            .map_err(|e| anyhow!("Failed to get page content: {}", e))?;

        let _ = tab.close(true);
        Ok(html)
    }
}
