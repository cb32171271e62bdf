// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! `smartspider run <url>... --task <text>`: extract records and write them.

use super::args::{check_urls, ModelArgs, OutputArgs, RenderArgs};
use crate::acquisition::RenderEngine;
use crate::metrics::aggregate_timings;
use crate::output::open_writer;
use crate::pipeline::{PageReport, Pipeline};
use crate::reasoning::Reasoner;
use anyhow::{Context, Result};
use clap::Args;
use smartspider::Record;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Pages to extract from; the first one is the primary URL
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// What to extract, in natural language
    #[arg(long, short)]
    pub task: String,

    /// Follow pagination and detail links from each URL
    #[arg(long)]
    pub follow: bool,

    /// Listing pages followed per start URL (with --follow)
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Detail-link depth (with --follow)
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Pages processed at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Write per-page reports (state, timings, errors) as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub render: RenderArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

pub async fn run(args: RunArgs) -> Result<()> {
    check_urls(&args.urls)?;

    let mut settings = args.render.settings()?;
    settings.retry = args.model.retry_policy();
    if let Some(n) = args.concurrency {
        anyhow::ensure!(n > 0, "--concurrency must be at least 1");
        settings.concurrency = n;
    }
    if let Some(n) = args.max_pages {
        settings.max_pages = n;
    }
    if let Some(n) = args.max_depth {
        settings.max_depth = n;
    }

    let client = args.model.client().context("model client")?;
    let reasoner = Reasoner::new(client, settings.retry);
    let engine = RenderEngine::from_settings(&settings).context("render engine")?;
    let pipeline = Pipeline::new(Arc::new(engine), reasoner, &settings);
    let mut writer = open_writer(&args.output.target())?;

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling outstanding pages");
            ctrl_c.cancel();
        }
    });

    let run_id = uuid::Uuid::new_v4();
    info!(%run_id, pages = args.urls.len(), follow = args.follow, "run started");
    let result = collect(&pipeline, &args, &token)
        .instrument(info_span!("run", %run_id))
        .await;
    pipeline.shutdown().await;
    let pages = result?;

    for page in &pages {
        print_page(page);
    }

    let records: Vec<Record> = pages.iter().flat_map(|p| p.records.iter().cloned()).collect();
    let written = writer.write(&records).await.context("writing records")?;
    eprintln!(
        "  {} record(s) -> {}",
        written.written, written.destination
    );

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&pages)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }

    let timings: Vec<_> = pages.iter().map(|p| p.timings.clone()).collect();
    for (stage, stats) in aggregate_timings(&timings) {
        info!(
            stage,
            mean_ms = stats.mean,
            max_ms = stats.max,
            samples = stats.samples,
            "stage timing"
        );
    }

    match pages.first() {
        Some(primary) if !primary.is_success() => {
            let reason = primary
                .error
                .as_ref()
                .map(|e| format!("{e}"))
                .unwrap_or_default();
            anyhow::bail!("{} failed at {}: {reason}", primary.url, primary.state.as_str())
        }
        _ => Ok(()),
    }
}

async fn collect(
    pipeline: &Pipeline,
    args: &RunArgs,
    token: &CancellationToken,
) -> Result<Vec<PageReport>> {
    if !args.follow {
        let batch = pipeline
            .run_batch(&args.urls, &args.task, token.clone())
            .await
            .context("parsing the task")?;
        return Ok(batch.pages);
    }

    let intent = pipeline
        .parse_intent(&args.task)
        .await
        .context("parsing the task")?;
    let mut pages = Vec::new();
    for url in &args.urls {
        if token.is_cancelled() {
            break;
        }
        pages.extend(pipeline.crawl(url, &intent, token).await);
    }
    Ok(pages)
}

fn print_page(page: &PageReport) {
    match &page.error {
        None => {
            let mode = page.render_mode.map(|m| m.as_str()).unwrap_or("-");
            let cached = if page.strategy_cached { ", cached strategy" } else { "" };
            let degraded = if page.degraded { ", degraded" } else { "" };
            eprintln!(
                "  [OK] {}  {} record(s), {mode}{cached}{degraded}, {}ms",
                page.url,
                page.records.len(),
                page.timings.total_ms()
            );
        }
        Some(e) => eprintln!(
            "  [!!] {}  failed at {}: {e}",
            page.url,
            page.state.as_str()
        ),
    }
}
