// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! WebDriver backend using thirtyfour (the `selenium` render mode).

use super::{BackendError, LoadedPage, ReleaseGuard, RenderBackend};
use async_trait::async_trait;
use futures::future::BoxFuture;
use smartspider::RenderMode;
use std::time::Duration;
use thirtyfour::{ChromiumLikeCapabilities, DesiredCapabilities, WebDriver};
use tokio::time::Instant;
use tracing::debug;
use url::Url;

/// Opens one WebDriver session per load against a Selenium server or
/// chromedriver, and quits it afterwards. Session creation counts against
/// the load timeout.
pub struct SeleniumBackend {
    server_url: String,
    user_agent: String,
    proxy: Option<String>,
}

impl SeleniumBackend {
    pub fn new(server_url: impl Into<String>, user_agent: impl Into<String>, proxy: Option<String>) -> Self {
        Self {
            server_url: server_url.into(),
            user_agent: user_agent.into(),
            proxy,
        }
    }

    async fn session(&self) -> Result<WebDriver, BackendError> {
        let mut caps = DesiredCapabilities::chrome();
        let mut args = vec![
            "--headless=new".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            format!("--user-agent={}", self.user_agent),
        ];
        if let Some(proxy) = &self.proxy {
            args.push(format!("--proxy-server={proxy}"));
        }
        for arg in &args {
            caps.add_arg(arg)
                .map_err(|e| BackendError::Unavailable(format!("invalid capability: {e}")))?;
        }

        WebDriver::new(self.server_url.as_str(), caps)
            .await
            .map_err(|e| {
                BackendError::Unavailable(format!(
                    "WebDriver at {} unreachable: {e}",
                    self.server_url
                ))
            })
    }
}

#[async_trait]
impl RenderBackend for SeleniumBackend {
    fn mode(&self) -> RenderMode {
        RenderMode::Selenium
    }

    async fn load(&self, url: &Url, timeout: Duration) -> Result<LoadedPage, BackendError> {
        let deadline = Instant::now() + timeout;
        let driver = match tokio::time::timeout_at(deadline, self.session()).await {
            Ok(driver) => driver?,
            Err(_) => return Err(BackendError::Timeout(timeout)),
        };
        let session = ReleaseGuard::new(driver.clone(), quit_session);

        let outcome = tokio::time::timeout_at(deadline, async {
            driver.goto(url.as_str()).await?;
            let content = driver.source().await?;
            let final_url = driver.current_url().await?;
            Ok::<_, thirtyfour::error::WebDriverError>((content, final_url))
        })
        .await;

        drop(driver);
        session.release().await;

        match outcome {
            Ok(Ok((content, final_url))) => Ok(LoadedPage {
                final_url: Url::parse(final_url.as_str()).unwrap_or_else(|_| url.clone()),
                content,
            }),
            Ok(Err(e)) => Err(BackendError::Transport(format!("WebDriver load failed: {e}"))),
            Err(_) => Err(BackendError::Timeout(timeout)),
        }
    }
}

fn quit_session(driver: WebDriver) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(e) = driver.quit().await {
            debug!(error = %e, "WebDriver quit failed");
        }
    })
}
