// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Static HTTP backend wrapping reqwest.
//!
//! Not a browser: just GET requests. Follows redirects, retries on 5xx and
//! backs off on 429. A 403 yields empty content so the dynamic-content
//! heuristic can escalate to a real browser.

use crate::renderer::{BackendError, LoadedPage, RenderBackend};
use async_trait::async_trait;
use smartspider::RenderMode;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const MAX_REDIRECTS: usize = 10;
const MAX_RETRIES: u32 = 2;

/// Plain HTTP backend (the `static` render mode).
#[derive(Clone)]
pub struct StaticBackend {
    client: reqwest::Client,
    /// HTTP/1.1-only fallback client for sites that reject HTTP/2.
    h1_client: reqwest::Client,
}

impl StaticBackend {
    pub fn new(user_agent: &str, proxy: Option<&str>) -> Result<Self, BackendError> {
        Ok(Self {
            client: Self::build_client(user_agent, proxy, false)?,
            h1_client: Self::build_client(user_agent, proxy, true)?,
        })
    }

    fn build_client(
        user_agent: &str,
        proxy: Option<&str>,
        http1_only: bool,
    ) -> Result<reqwest::Client, BackendError> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(user_agent);
        if http1_only {
            builder = builder.http1_only();
        }
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| BackendError::Unavailable(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| BackendError::Unavailable(format!("failed to build HTTP client: {e}")))
    }

    async fn get_inner(
        &self,
        client: &reqwest::Client,
        url: &Url,
        timeout: Duration,
    ) -> Result<LoadedPage, reqwest::Error> {
        let mut retries = 0u32;

        loop {
            let resp = client
                .get(url.clone())
                .header("Upgrade-Insecure-Requests", "1")
                .timeout(timeout)
                .send()
                .await;

            match resp {
                Ok(r) => {
                    let status = r.status().as_u16();
                    let final_url = r.url().clone();

                    // Retry on 5xx
                    if status >= 500 && retries < MAX_RETRIES {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        debug!(url = %url, status, retries, "retrying after server error");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    // Backoff on 429
                    if status == 429 && retries < MAX_RETRIES {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        tokio::time::sleep(Duration::from_secs(retry_after.min(10))).await;
                        continue;
                    }

                    if status == 403 {
                        warn!(url = %url, "403 Forbidden, returning empty content");
                        return Ok(LoadedPage {
                            final_url,
                            content: String::new(),
                        });
                    }

                    let r = r.error_for_status()?;
                    let content = r.text().await?;
                    return Ok(LoadedPage { final_url, content });
                }
                Err(e) => {
                    if retries < MAX_RETRIES && !e.is_timeout() {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl RenderBackend for StaticBackend {
    fn mode(&self) -> RenderMode {
        RenderMode::Static
    }

    /// Single GET with retry. Falls back to HTTP/1.1 on protocol errors
    /// (some CDNs reject HTTP/2).
    async fn load(&self, url: &Url, timeout: Duration) -> Result<LoadedPage, BackendError> {
        let result = match self.get_inner(&self.client, url, timeout).await {
            Ok(page) => Ok(page),
            Err(e) => {
                let err_str = format!("{e}");
                if err_str.contains("http2")
                    || err_str.contains("protocol")
                    || err_str.contains("connection closed")
                {
                    self.get_inner(&self.h1_client, url, timeout).await
                } else {
                    Err(e)
                }
            }
        };

        result.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(timeout)
            } else {
                BackendError::Transport(e.to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend() -> StaticBackend {
        StaticBackend::new("smartspider-test", None).unwrap()
    }

    #[tokio::test]
    async fn test_redirect_sets_final_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", "/en/"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/en/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let page = backend().load(&url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(page.final_url.path(), "/en/");
        assert_eq!(page.content, "<html>hi</html>");
    }

    #[tokio::test]
    async fn test_forbidden_yields_empty_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/private", server.uri())).unwrap();
        let page = backend().load(&url, Duration::from_secs(5)).await.unwrap();
        assert!(page.content.is_empty());
    }

    #[tokio::test]
    async fn test_not_found_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = backend().load(&url, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let err = backend()
            .load(&url, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
    }
}
