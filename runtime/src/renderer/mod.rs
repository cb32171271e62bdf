// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Render backend abstraction.
//!
//! Every way of obtaining a page's markup (plain HTTP, headless Chromium,
//! a WebDriver session) implements [`RenderBackend`]. The escalation engine
//! treats them uniformly; adding a backend means implementing the trait.

pub mod chromium;
pub mod webdriver;

use async_trait::async_trait;
use futures::future::BoxFuture;
use smartspider::RenderMode;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Markup as served by a backend.
#[derive(Debug, Clone)]
pub struct LoadedPage {
    /// URL the content was actually served from, after redirects or
    /// client-side navigation.
    pub final_url: Url,
    pub content: String,
}

/// Why a backend could not load a page.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend cannot work in this environment (browser not installed,
    /// driver unreachable). The engine disables it for the rest of the run.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Transport, navigation or protocol failure for this URL.
    #[error("load failed: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl BackendError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

/// A way of loading a page.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Render mode tag recorded on results from this backend.
    fn mode(&self) -> RenderMode;

    /// Load `url`. Implementations must bound the whole load, session setup
    /// included, by `timeout`. The engine's outer guard allows a short grace
    /// period on top for releasing tabs and sessions.
    async fn load(&self, url: &Url, timeout: Duration) -> Result<LoadedPage, BackendError>;

    /// Release held resources (browser processes, sessions).
    async fn shutdown(&self) {}
}

/// A backend that is never available. Stands in for browser backends that
/// were not configured.
pub struct NoopBackend {
    mode: RenderMode,
}

impl NoopBackend {
    pub fn new(mode: RenderMode) -> Self {
        Self { mode }
    }
}

#[async_trait]
impl RenderBackend for NoopBackend {
    fn mode(&self) -> RenderMode {
        self.mode
    }

    async fn load(&self, _url: &Url, _timeout: Duration) -> Result<LoadedPage, BackendError> {
        Err(BackendError::Unavailable(format!(
            "{} backend not configured",
            self.mode
        )))
    }
}

/// A per-load resource (a browser tab, a WebDriver session) that must be
/// released exactly once.
///
/// [`ReleaseGuard::release`] awaits the release on the normal path. If the
/// load future is dropped first, for instance by an outer timeout, `Drop`
/// hands the release to a spawned task instead.
pub(crate) struct ReleaseGuard<T: Send + 'static> {
    resource: Option<T>,
    release: fn(T) -> BoxFuture<'static, ()>,
}

impl<T: Send + 'static> ReleaseGuard<T> {
    pub(crate) fn new(resource: T, release: fn(T) -> BoxFuture<'static, ()>) -> Self {
        Self {
            resource: Some(resource),
            release,
        }
    }

    pub(crate) async fn release(mut self) {
        if let Some(resource) = self.resource.take() {
            (self.release)(resource).await;
        }
    }
}

impl<T: Send + 'static> Drop for ReleaseGuard<T> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn((self.release)(resource));
                }
                Err(_) => tracing::warn!("no runtime to release a dropped render resource"),
            }
        }
    }
}
