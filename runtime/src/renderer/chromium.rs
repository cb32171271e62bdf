// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Headless Chromium backend using chromiumoxide (the `playwright` render mode).

use super::{BackendError, LoadedPage, ReleaseGuard, RenderBackend};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::future::BoxFuture;
use futures::StreamExt;
use smartspider::RenderMode;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Explicit path (SMARTSPIDER_CHROMIUM_PATH)
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    // 2. ~/.smartspider/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".smartspider/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".smartspider/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".smartspider/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".smartspider/chromium/chrome-linux64/chrome"),
                home.join(".smartspider/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-backed renderer. The browser is launched on first use and
/// reused; each load opens its own tab and closes it even when the load
/// is abandoned.
pub struct ChromiumBackend {
    chromium_path: Option<PathBuf>,
    user_agent: String,
    proxy: Option<String>,
    browser: OnceCell<Browser>,
}

impl ChromiumBackend {
    pub fn new(chromium_path: Option<PathBuf>, user_agent: impl Into<String>, proxy: Option<String>) -> Self {
        Self {
            chromium_path,
            user_agent: user_agent.into(),
            proxy,
            browser: OnceCell::new(),
        }
    }

    async fn browser(&self) -> Result<&Browser, BackendError> {
        self.browser.get_or_try_init(|| self.launch()).await
    }

    async fn launch(&self) -> Result<Browser, BackendError> {
        let chrome_path = find_chromium(self.chromium_path.as_deref()).ok_or_else(|| {
            BackendError::Unavailable(
                "Chromium not found. Set SMARTSPIDER_CHROMIUM_PATH or install Chrome.".into(),
            )
        })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={}", self.user_agent));
        if let Some(proxy) = &self.proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        let config = builder
            .build()
            .map_err(|e| BackendError::Unavailable(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BackendError::Unavailable(format!("failed to launch Chromium: {e}")))?;

        // Drive the CDP connection
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        info!(path = %chrome_path.display(), "Chromium launched");
        Ok(browser)
    }
}

#[async_trait]
impl RenderBackend for ChromiumBackend {
    fn mode(&self) -> RenderMode {
        RenderMode::Playwright
    }

    async fn load(&self, url: &Url, timeout: Duration) -> Result<LoadedPage, BackendError> {
        let browser = self.browser().await?;
        let deadline = Instant::now() + timeout;

        let page = match tokio::time::timeout_at(deadline, browser.new_page("about:blank")).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => return Err(BackendError::Transport(format!("failed to open tab: {e}"))),
            Err(_) => return Err(BackendError::Timeout(timeout)),
        };
        let tab = ReleaseGuard::new(page.clone(), close_tab);

        let outcome = tokio::time::timeout_at(deadline, async {
            page.goto(url.as_str()).await?;
            let _ = page.wait_for_navigation().await;
            let content = page.content().await?;
            let final_url = page.url().await?;
            Ok::<_, chromiumoxide::error::CdpError>((content, final_url))
        })
        .await;

        tab.release().await;

        match outcome {
            Ok(Ok((content, final_url))) => {
                let final_url = final_url
                    .and_then(|u| Url::parse(&u).ok())
                    .unwrap_or_else(|| url.clone());
                debug!(url = %url, final_url = %final_url, bytes = content.len(), "Chromium load");
                Ok(LoadedPage { final_url, content })
            }
            Ok(Err(e)) => Err(BackendError::Transport(format!("navigation failed: {e}"))),
            Err(_) => Err(BackendError::Timeout(timeout)),
        }
    }
}

fn close_tab(page: Page) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(e) = page.close().await {
            debug!(error = %e, "failed to close tab");
        }
    })
}
