// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime settings with environment overrides.

use smartspider::RenderMode;
use std::path::PathBuf;
use std::time::Duration;

/// Chrome 120 desktop user agent sent by every backend.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";

/// Retry policy for the reasoning layer's self-correction loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Extra model calls after the first one.
    pub max_retries: u32,
    pub backoff: Duration,
    pub backoff_factor: f64,
    /// Overall budget for one `ask`, retries included.
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(500),
            backoff_factor: 1.5,
            deadline: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_factor.powi(retry.saturating_sub(1) as i32);
        self.backoff.mul_f64(factor)
    }

    /// No waiting between attempts. Used by tests and the mock provider.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// All runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub user_agent: String,
    /// Per-backend attempt deadline.
    pub backend_timeout: Duration,
    /// Ordered browser backends tried after the static fetch.
    pub render_backends: Vec<RenderMode>,
    pub auto_render: bool,
    pub chromium_path: Option<PathBuf>,
    pub webdriver_url: String,
    pub proxy: Option<String>,
    pub retry: RetryPolicy,
    pub max_pages: u32,
    pub max_depth: u32,
    /// Pages processed at once by the batch runner.
    pub concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            backend_timeout: Duration::from_secs(10),
            render_backends: vec![RenderMode::Playwright, RenderMode::Selenium],
            auto_render: true,
            chromium_path: None,
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            proxy: None,
            retry: RetryPolicy::default(),
            max_pages: 3,
            max_depth: 2,
            concurrency: 4,
        }
    }
}

impl Settings {
    /// Defaults overridden by `SMARTSPIDER_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Unparsable values are ignored
    /// with a warning.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(ua) = get("SMARTSPIDER_USER_AGENT") {
            self.user_agent = ua;
        }
        if let Some(secs) = get("SMARTSPIDER_TIMEOUT_SECS") {
            match secs.trim().parse::<f64>() {
                Ok(s) if s > 0.0 && s.is_finite() => {
                    self.backend_timeout = Duration::from_secs_f64(s);
                }
                _ => tracing::warn!(value = %secs, "ignoring invalid SMARTSPIDER_TIMEOUT_SECS"),
            }
        }
        if let Some(path) = get("SMARTSPIDER_CHROMIUM_PATH") {
            self.chromium_path = Some(PathBuf::from(path));
        }
        if let Some(url) = get("SMARTSPIDER_WEBDRIVER_URL") {
            self.webdriver_url = url;
        }
        if let Some(proxy) = get("SMARTSPIDER_PROXY") {
            self.proxy = Some(proxy);
        }
        self
    }

    /// Full backend order: static first, then the configured browsers.
    pub fn backend_order(&self) -> Vec<RenderMode> {
        let mut order = vec![RenderMode::Static];
        for mode in &self.render_backends {
            if !order.contains(mode) {
                order.push(*mode);
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SMARTSPIDER_TIMEOUT_SECS", "2.5"),
            ("SMARTSPIDER_WEBDRIVER_URL", "http://grid:4444/wd/hub"),
            ("SMARTSPIDER_USER_AGENT", "  "),
        ]
        .into_iter()
        .collect();
        let settings = Settings::default().with_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(settings.backend_timeout, Duration::from_millis(2500));
        assert_eq!(settings.webdriver_url, "http://grid:4444/wd/hub");
        assert_eq!(settings.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_invalid_timeout_is_ignored() {
        let settings =
            Settings::default().with_env(|k| (k == "SMARTSPIDER_TIMEOUT_SECS").then(|| "-1".into()));
        assert_eq!(settings.backend_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_backend_order_starts_static_and_dedups() {
        let settings = Settings {
            render_backends: vec![
                RenderMode::Selenium,
                RenderMode::Static,
                RenderMode::Selenium,
                RenderMode::Playwright,
            ],
            ..Settings::default()
        };
        assert_eq!(
            settings.backend_order(),
            vec![RenderMode::Static, RenderMode::Selenium, RenderMode::Playwright]
        );
    }

    #[test]
    fn test_retry_delays_grow_by_factor() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(750));
        assert_eq!(RetryPolicy::immediate(2).delay_for(2), Duration::ZERO);
    }
}
