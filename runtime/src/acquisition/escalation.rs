// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Render escalation engine.
//!
//! Tries an ordered list of backends (static first), accepting the first
//! result that passes the dynamic-content heuristic. Backend failures and
//! timeouts move on to the next backend. When every backend is exhausted the
//! last content obtained is returned, marked degraded; only a run that
//! obtained no content at all fails.
//!
//! Each backend bounds its own load by the attempt timeout. The engine's
//! outer guard fires only for backends that overrun it by more than
//! [`RELEASE_GRACE`].

use super::http_client::StaticBackend;
use super::js_heuristic;
use crate::config::Settings;
use crate::renderer::chromium::ChromiumBackend;
use crate::renderer::webdriver::SeleniumBackend;
use crate::renderer::{BackendError, LoadedPage, RenderBackend};
use smartspider::{AttemptOutcome, BackendAttempt, FetchFailure, FetchResult, RenderMode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Extra time the outer guard allows past the attempt deadline, so a backend
/// that timed out itself can still release its tab or session.
const RELEASE_GRACE: Duration = Duration::from_secs(5);

struct Slot {
    backend: Arc<dyn RenderBackend>,
    /// Set once the backend reports itself unavailable.
    disabled: AtomicBool,
}

/// Orchestrates fallback across render backends. Shared by every page of a
/// run; disabled backends stay disabled for the engine's lifetime.
pub struct RenderEngine {
    slots: Vec<Slot>,
    timeout: Duration,
    auto_render: bool,
}

impl RenderEngine {
    pub fn new(backends: Vec<Arc<dyn RenderBackend>>, timeout: Duration, auto_render: bool) -> Self {
        Self {
            slots: backends
                .into_iter()
                .map(|backend| Slot {
                    backend,
                    disabled: AtomicBool::new(false),
                })
                .collect(),
            timeout,
            auto_render,
        }
    }

    /// Build the static backend plus the configured browser backends.
    pub fn from_settings(settings: &Settings) -> Result<Self, BackendError> {
        let mut backends: Vec<Arc<dyn RenderBackend>> = Vec::new();
        for mode in settings.backend_order() {
            let backend: Arc<dyn RenderBackend> = match mode {
                RenderMode::Static => Arc::new(StaticBackend::new(
                    &settings.user_agent,
                    settings.proxy.as_deref(),
                )?),
                RenderMode::Playwright => Arc::new(ChromiumBackend::new(
                    settings.chromium_path.clone(),
                    settings.user_agent.clone(),
                    settings.proxy.clone(),
                )),
                RenderMode::Selenium => Arc::new(SeleniumBackend::new(
                    settings.webdriver_url.clone(),
                    settings.user_agent.clone(),
                    settings.proxy.clone(),
                )),
            };
            backends.push(backend);
        }
        Ok(Self::new(
            backends,
            settings.backend_timeout,
            settings.auto_render,
        ))
    }

    pub fn modes(&self) -> Vec<RenderMode> {
        self.slots.iter().map(|s| s.backend.mode()).collect()
    }

    pub fn is_disabled(&self, mode: RenderMode) -> bool {
        self.slots
            .iter()
            .any(|s| s.backend.mode() == mode && s.disabled.load(Ordering::Relaxed))
    }

    /// Fetch a page. `required` lists selectors a pending strategy needs;
    /// content lacking any of them counts as JS-dependent.
    pub async fn fetch(&self, url: &str, required: &[&str]) -> Result<FetchResult, FetchFailure> {
        let target = normalize_url(url).map_err(|reason| {
            warn!(url, %reason, "invalid URL");
            FetchFailure {
                url: url.to_string(),
                attempts: Vec::new(),
            }
        })?;

        let mut attempts = Vec::new();
        let mut last_ok: Option<(LoadedPage, RenderMode)> = None;

        for (index, slot) in self.slots.iter().enumerate() {
            if !self.auto_render && index > 0 {
                break;
            }
            let mode = slot.backend.mode();
            if slot.disabled.load(Ordering::Relaxed) {
                attempts.push(BackendAttempt::new(mode, AttemptOutcome::Skipped));
                continue;
            }

            let loaded = tokio::time::timeout(
                self.timeout + RELEASE_GRACE,
                slot.backend.load(&target, self.timeout),
            )
            .await;
            let page = match loaded {
                Ok(Ok(page)) => page,
                Ok(Err(e)) => {
                    warn!(url = %target, backend = %mode, error = %e, "render backend failed");
                    let outcome = match &e {
                        BackendError::Timeout(d) => AttemptOutcome::TimedOut {
                            timeout_ms: d.as_millis() as u64,
                        },
                        other => AttemptOutcome::Failed {
                            error: other.to_string(),
                        },
                    };
                    if e.is_unavailable() {
                        slot.disabled.store(true, Ordering::Relaxed);
                        info!(backend = %mode, "disabling render backend for this run");
                    }
                    attempts.push(BackendAttempt::new(mode, outcome));
                    continue;
                }
                Err(_) => {
                    warn!(url = %target, backend = %mode, timeout = ?self.timeout, "render backend timed out");
                    attempts.push(BackendAttempt::new(
                        mode,
                        AttemptOutcome::TimedOut {
                            timeout_ms: self.timeout.as_millis() as u64,
                        },
                    ));
                    continue;
                }
            };

            let verdict = js_heuristic::inspect(&page.content, required);
            let accept = if self.auto_render {
                !verdict.needs_render()
            } else {
                !page.content.trim().is_empty()
            };

            if accept {
                debug!(url = %target, backend = %mode, final_url = %page.final_url, "content accepted");
                attempts.push(BackendAttempt::new(mode, AttemptOutcome::Accepted));
                return Ok(FetchResult {
                    final_url: page.final_url,
                    content: page.content,
                    render_mode: mode,
                    degraded: false,
                    attempts,
                });
            }

            debug!(url = %target, backend = %mode, signals = ?verdict.labels(), "content looks JS-dependent");
            attempts.push(BackendAttempt::new(
                mode,
                AttemptOutcome::Flagged {
                    signals: verdict.labels(),
                },
            ));
            if !page.content.trim().is_empty() {
                last_ok = Some((page, mode));
            }
        }

        match last_ok {
            Some((page, mode)) => {
                warn!(url = %target, backend = %mode, "no backend passed the heuristic, returning degraded content");
                Ok(FetchResult {
                    final_url: page.final_url,
                    content: page.content,
                    render_mode: mode,
                    degraded: true,
                    attempts,
                })
            }
            None => Err(FetchFailure {
                url: target.to_string(),
                attempts,
            }),
        }
    }

    pub async fn shutdown(&self) {
        for slot in &self.slots {
            slot.backend.shutdown().await;
        }
    }
}

/// Parse a caller-supplied URL, assuming `https://` when no scheme is given.
pub fn normalize_url(raw: &str) -> Result<Url, url::ParseError> {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(url) if url.cannot_be_a_base() && !raw.starts_with("data:") => {
            Url::parse(&format!("https://{raw}"))
        }
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{raw}")),
        Err(e) => Err(e),
    }
}
