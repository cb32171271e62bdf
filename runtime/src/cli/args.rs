// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Flag groups shared by the subcommands.

use crate::config::{RetryPolicy, Settings};
use crate::output::{DbConfig, OutputMode, OutputTarget};
use crate::reasoning::{GeminiClient, MockModelClient, ModelClient, OpenAiClient};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use smartspider::RenderMode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Provider {
    /// OpenAI or any chat-completions compatible endpoint
    #[default]
    Openai,
    Gemini,
    /// Deterministic offline replies
    Mock,
}

#[derive(Debug, Clone, Args)]
pub struct ModelArgs {
    /// Model provider
    #[arg(long, value_enum, default_value_t = Provider::Openai)]
    pub provider: Provider,

    /// Model name (provider default when omitted)
    #[arg(long)]
    pub model: Option<String>,

    /// API key (falls back to OPENAI_API_KEY / GEMINI_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[arg(long)]
    pub base_url: Option<String>,

    /// Extra model calls allowed after a rejected reply
    #[arg(long, default_value = "2")]
    pub max_retries: u32,
}

impl ModelArgs {
    pub fn client(&self) -> Result<Arc<dyn ModelClient>> {
        Ok(match self.provider {
            Provider::Openai => {
                let mut client = match &self.api_key {
                    Some(key) => OpenAiClient::new(key.clone())?,
                    None => OpenAiClient::from_env()?,
                };
                if let Some(url) = &self.base_url {
                    client = client.with_base_url(url.clone());
                }
                if let Some(model) = &self.model {
                    client = client.with_model(model.clone());
                }
                Arc::new(client)
            }
            Provider::Gemini => {
                let mut client = match &self.api_key {
                    Some(key) => GeminiClient::new(key.clone())?,
                    None => GeminiClient::from_env()?,
                };
                if let Some(url) = &self.base_url {
                    client = client.with_base_url(url.clone());
                }
                if let Some(model) = &self.model {
                    client = client.with_model(model.clone());
                }
                Arc::new(client)
            }
            Provider::Mock => Arc::new(MockModelClient::new()),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self.provider {
            Provider::Mock => RetryPolicy::immediate(self.max_retries),
            _ => RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            },
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RenderArgs {
    /// Browser backends tried after the static fetch, in order
    #[arg(long, value_delimiter = ',', default_value = "playwright,selenium")]
    pub render_backends: Vec<RenderMode>,

    /// Accept the static fetch as-is; never start a browser
    #[arg(long)]
    pub disable_auto_render: bool,

    /// Per-backend timeout in seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Proxy URL used by every backend
    #[arg(long)]
    pub proxy: Option<String>,

    /// WebDriver server for the selenium backend
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// Chromium binary for the playwright backend
    #[arg(long)]
    pub chromium_path: Option<PathBuf>,
}

impl RenderArgs {
    /// Environment settings with these flags on top.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::from_env();
        settings.render_backends = self
            .render_backends
            .iter()
            .copied()
            .filter(RenderMode::is_dynamic)
            .collect();
        settings.auto_render = !self.disable_auto_render;
        if let Some(secs) = self.timeout {
            anyhow::ensure!(
                secs > 0.0 && secs.is_finite(),
                "--timeout must be a positive number of seconds"
            );
            settings.backend_timeout = Duration::from_secs_f64(secs);
        }
        if let Some(proxy) = &self.proxy {
            settings.proxy = Some(proxy.clone());
        }
        if let Some(url) = &self.webdriver_url {
            settings.webdriver_url = url.clone();
        }
        if let Some(path) = &self.chromium_path {
            settings.chromium_path = Some(path.clone());
        }
        Ok(settings)
    }
}

#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Where records go
    #[arg(long, value_enum, default_value_t = OutputMode::Print)]
    pub output_mode: OutputMode,

    /// File path for txt/json/csv/sqlite
    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[arg(long, default_value = "localhost")]
    pub db_host: String,

    #[arg(long)]
    pub db_port: Option<u16>,

    #[arg(long)]
    pub db_user: Option<String>,

    #[arg(long)]
    pub db_password: Option<String>,

    #[arg(long)]
    pub db_name: Option<String>,

    #[arg(long, default_value = crate::output::sql::DEFAULT_TABLE)]
    pub db_table: String,
}

impl OutputArgs {
    pub fn target(&self) -> OutputTarget {
        OutputTarget {
            mode: self.output_mode,
            path: self.output_path.clone(),
            db: DbConfig {
                host: self.db_host.clone(),
                port: self.db_port,
                user: self.db_user.clone(),
                password: self.db_password.clone(),
                database: self.db_name.clone(),
                table: self.db_table.clone(),
            },
        }
    }
}

/// Reject URL arguments that can never be fetched before any work starts.
pub fn check_urls(urls: &[String]) -> Result<()> {
    for url in urls {
        crate::acquisition::escalation::normalize_url(url)
            .with_context(|| format!("invalid URL: {url}"))?;
    }
    Ok(())
}
