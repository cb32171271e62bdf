// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! `smartspider summarize <url>`: print the DOM summary the model would see.

use super::args::{check_urls, RenderArgs};
use crate::acquisition::RenderEngine;
use crate::extraction::DomSummarizer;
use anyhow::{Context, Result};

pub async fn run(url: &str, render: &RenderArgs, pretty: bool) -> Result<()> {
    check_urls(&[url.to_string()])?;
    let settings = render.settings()?;
    let engine = RenderEngine::from_settings(&settings).context("render engine")?;

    let fetched = engine.fetch(url, &[]).await;
    engine.shutdown().await;
    let fetched = fetched?;

    eprintln!(
        "  {} via {}{}",
        fetched.final_url,
        fetched.render_mode,
        if fetched.degraded { " (degraded)" } else { "" }
    );

    let summary = DomSummarizer::default().summarize(&fetched.content);
    if pretty {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", summary.to_json());
    }
    Ok(())
}
