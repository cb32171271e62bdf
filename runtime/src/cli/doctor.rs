// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment readiness check.

use crate::config::Settings;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use std::time::Duration;

/// Check browser backends and model credentials.
pub async fn run() -> Result<()> {
    let settings = Settings::from_env();

    println!("SmartSpider Doctor");
    println!("==================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    println!("[OK] static backend (built in)");

    match find_chromium(settings.chromium_path.as_deref()) {
        Some(path) => println!("[OK] playwright backend: Chromium at {}", path.display()),
        None => println!(
            "[!!] playwright backend: Chromium NOT found. Set SMARTSPIDER_CHROMIUM_PATH or install google-chrome."
        ),
    }

    if webdriver_ready(&settings.webdriver_url).await {
        println!("[OK] selenium backend: WebDriver at {}", settings.webdriver_url);
    } else {
        println!(
            "[!!] selenium backend: no WebDriver answering at {}",
            settings.webdriver_url
        );
    }

    if let Some(proxy) = &settings.proxy {
        println!("[OK] proxy: {proxy}");
    }
    println!();

    let mut keys = 0;
    for var in ["OPENAI_API_KEY", "GEMINI_API_KEY"] {
        if std::env::var(var).is_ok_and(|v| !v.trim().is_empty()) {
            println!("[OK] {var} is set");
            keys += 1;
        } else {
            println!("[!!] {var} is not set");
        }
    }

    println!();
    if keys > 0 {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
        println!("  Set OPENAI_API_KEY or GEMINI_API_KEY, or run with --provider mock.");
    }

    Ok(())
}

/// Whether a WebDriver server answers `GET /status`.
async fn webdriver_ready(base: &str) -> bool {
    let Ok(client) = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    else {
        return false;
    };
    let url = format!("{}/status", base.trim_end_matches('/'));
    matches!(client.get(url).send().await, Ok(resp) if resp.status().is_success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_webdriver_status_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": {"ready": true}
            })))
            .mount(&server)
            .await;

        assert!(webdriver_ready(&format!("{}/", server.uri())).await);
        assert!(!webdriver_ready("http://127.0.0.1:9").await);
    }
}
