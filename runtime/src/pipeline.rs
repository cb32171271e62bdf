// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-page pipeline and batch runner.
//!
//! Each page moves through
//! `Pending -> Fetched -> Summarized -> Typed -> IntentBound -> StrategyBuilt -> Executed -> Recorded`.
//! A failure stops that page only and is reported with the last state the
//! page reached. Pages share nothing but the render engine (whose disabled
//! backends are sticky) and the strategy cache.

use crate::acquisition::{normalize_url, RenderEngine};
use crate::config::Settings;
use crate::extraction::{execute, DomSummarizer, Navigation};
use crate::intelligence::{predict_page_type, StrategyCache};
use crate::reasoning::{IntentParser, PageClassifier, Reasoner, StrategyBuilder};
use futures::stream::{self, StreamExt};
use serde::{Serialize, Serializer};
use smartspider::{Intent, PageType, PipelineError, Record, RenderMode};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Last state a page reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    Pending,
    Fetched,
    Summarized,
    Typed,
    IntentBound,
    StrategyBuilt,
    Executed,
    Recorded,
}

impl PageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageState::Pending => "pending",
            PageState::Fetched => "fetched",
            PageState::Summarized => "summarized",
            PageState::Typed => "typed",
            PageState::IntentBound => "intent_bound",
            PageState::StrategyBuilt => "strategy_built",
            PageState::Executed => "executed",
            PageState::Recorded => "recorded",
        }
    }
}

/// Wall time per stage, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub fetch_ms: Option<u64>,
    pub summarize_ms: Option<u64>,
    pub typing_ms: Option<u64>,
    pub strategy_ms: Option<u64>,
    pub execute_ms: Option<u64>,
}

impl StageTimings {
    /// Recorded stages in pipeline order.
    pub fn stages(&self) -> Vec<(&'static str, u64)> {
        [
            ("fetch", self.fetch_ms),
            ("summarize", self.summarize_ms),
            ("typing", self.typing_ms),
            ("strategy", self.strategy_ms),
            ("execute", self.execute_ms),
        ]
        .into_iter()
        .filter_map(|(name, ms)| ms.map(|ms| (name, ms)))
        .collect()
    }

    pub fn total_ms(&self) -> u64 {
        self.stages().iter().map(|(_, ms)| ms).sum()
    }
}

fn millis(start: Instant) -> Option<u64> {
    Some(start.elapsed().as_millis() as u64)
}

fn serialize_error<S: Serializer>(
    error: &Option<PipelineError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serde_json::json!({"kind": e.kind(), "message": e.to_string()}).serialize(serializer),
        None => serializer.serialize_none(),
    }
}

/// Outcome of one page.
#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    /// URL as requested.
    pub url: String,
    pub state: PageState,
    pub final_url: Option<Url>,
    pub render_mode: Option<RenderMode>,
    pub degraded: bool,
    pub page_type: Option<PageType>,
    /// Strategy came from the cache rather than a model call.
    pub strategy_cached: bool,
    pub records: Vec<Record>,
    pub navigation: Navigation,
    pub timings: StageTimings,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<PipelineError>,
}

impl PageReport {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            state: PageState::Pending,
            final_url: None,
            render_mode: None,
            degraded: false,
            page_type: None,
            strategy_cached: false,
            records: Vec::new(),
            navigation: Navigation::default(),
            timings: StageTimings::default(),
            error: None,
        }
    }

    fn fail(mut self, error: impl Into<PipelineError>) -> Self {
        let error = error.into();
        warn!(url = %self.url, state = self.state.as_str(), kind = error.kind(), error = %error, "page failed");
        self.error = Some(error);
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.state == PageState::Recorded
    }
}

/// Outcome of a batch, pages in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub intent: Intent,
    pub pages: Vec<PageReport>,
}

impl BatchReport {
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.pages.iter().flat_map(|p| p.records.iter())
    }

    pub fn succeeded(&self) -> usize {
        self.pages.iter().filter(|p| p.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.pages.len() - self.succeeded()
    }
}

/// Crawl limits for [`Pipeline::crawl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlLimits {
    /// Listing pages followed through pagination, the start page included.
    pub max_pages: u32,
    /// Levels of detail links followed below a listing page.
    pub max_depth: u32,
}

impl CrawlLimits {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_pages: settings.max_pages.max(1),
            max_depth: settings.max_depth,
        }
    }
}

/// The reasoning-to-execution pipeline.
pub struct Pipeline {
    engine: Arc<RenderEngine>,
    summarizer: DomSummarizer,
    intents: IntentParser,
    classifier: PageClassifier,
    strategies: StrategyBuilder,
    cache: Arc<StrategyCache>,
    concurrency: usize,
    limits: CrawlLimits,
}

impl Pipeline {
    pub fn new(engine: Arc<RenderEngine>, reasoner: Reasoner, settings: &Settings) -> Self {
        Self {
            engine,
            summarizer: DomSummarizer::default(),
            intents: IntentParser::new(reasoner.clone()),
            classifier: PageClassifier::new(reasoner.clone()),
            strategies: StrategyBuilder::new(reasoner)
                .with_limits(settings.max_pages, settings.max_depth),
            cache: Arc::new(StrategyCache::new()),
            concurrency: settings.concurrency.max(1),
            limits: CrawlLimits::from_settings(settings),
        }
    }

    /// Share a strategy cache with other pipelines.
    pub fn with_cache(mut self, cache: Arc<StrategyCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<StrategyCache> {
        &self.cache
    }

    pub fn engine(&self) -> &Arc<RenderEngine> {
        &self.engine
    }

    pub async fn parse_intent(&self, task: &str) -> Result<Intent, PipelineError> {
        Ok(self.intents.parse(task).await?)
    }

    /// Run one page through every stage.
    pub async fn process_page(&self, url: &str, intent: &Intent) -> PageReport {
        let mut report = PageReport::new(url);

        // The strategy cached for the page type this URL predicts tells the
        // heuristic which elements the page must contain. Without a
        // prediction nothing is required until the page has been typed.
        let predicted_strategy = normalize_url(url).ok().and_then(|target| {
            let page_type = predict_page_type(&target)?;
            self.cache.get(target.host_str()?, page_type)
        });
        let required: Vec<&str> = predicted_strategy
            .as_deref()
            .map(|s| s.required_selectors())
            .unwrap_or_default();

        let start = Instant::now();
        let fetched = match self.engine.fetch(url, &required).await {
            Ok(fetched) => fetched,
            Err(e) => return report.fail(e),
        };
        report.timings.fetch_ms = millis(start);
        report.state = PageState::Fetched;
        report.final_url = Some(fetched.final_url.clone());
        report.render_mode = Some(fetched.render_mode);
        report.degraded = fetched.degraded;

        let start = Instant::now();
        let summary = self.summarizer.summarize(&fetched.content);
        report.timings.summarize_ms = millis(start);
        report.state = PageState::Summarized;

        let start = Instant::now();
        let typing = match self.classifier.classify(&summary).await {
            Ok(typing) => typing,
            Err(e) => return report.fail(e),
        };
        report.timings.typing_ms = millis(start);
        report.state = PageState::Typed;
        report.page_type = Some(typing.page_type);

        report.state = PageState::IntentBound;

        let site = fetched.site();
        let start = Instant::now();
        let strategy = match self.cache.get(&site, typing.page_type) {
            Some(strategy) => {
                report.strategy_cached = true;
                strategy
            }
            None => match self.strategies.build(&typing, intent, &summary).await {
                Ok(strategy) => self.cache.insert(&site, typing.page_type, strategy),
                Err(e) => return report.fail(e),
            },
        };
        report.timings.strategy_ms = millis(start);
        report.state = PageState::StrategyBuilt;

        let start = Instant::now();
        let execution = match execute(&fetched.final_url, &strategy, &fetched.content, intent.max_items) {
            Ok(execution) => execution,
            Err(e) => return report.fail(e),
        };
        report.timings.execute_ms = millis(start);
        report.state = PageState::Executed;

        report.records = execution.records;
        report.navigation = execution.navigation;
        report.state = PageState::Recorded;
        debug!(
            url,
            final_url = %fetched.final_url,
            records = report.records.len(),
            cached = report.strategy_cached,
            total_ms = report.timings.total_ms(),
            "page recorded"
        );
        report
    }

    /// `process_page`, abandoned as soon as `token` is cancelled.
    pub async fn process_page_cancellable(
        &self,
        url: &str,
        intent: &Intent,
        token: &CancellationToken,
    ) -> PageReport {
        if token.is_cancelled() {
            return PageReport::new(url).fail(PipelineError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => PageReport::new(url).fail(PipelineError::Cancelled),
            report = self.process_page(url, intent) => report,
        }
    }

    /// Parse the task once, then process `urls` with bounded concurrency.
    /// Reports come back in input order. Fails only when the task itself
    /// cannot be parsed.
    pub async fn run_batch(
        &self,
        urls: &[String],
        task: &str,
        token: CancellationToken,
    ) -> Result<BatchReport, PipelineError> {
        let intent = self.parse_intent(task).await?;
        info!(
            pages = urls.len(),
            intent_type = intent.intent_type.as_str(),
            fields = ?intent.field_names(),
            concurrency = self.concurrency,
            "starting batch"
        );

        let pages: Vec<PageReport> = stream::iter(urls)
            .map(|url| self.process_page_cancellable(url, &intent, &token))
            .buffered(self.concurrency)
            .collect()
            .await;

        let report = BatchReport { intent, pages };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "batch finished"
        );
        Ok(report)
    }

    /// Process `start` and follow its navigation: pagination up to
    /// `max_pages` listing pages, detail links down to `max_depth` levels.
    /// Stops once `intent.max_items` records were collected.
    pub async fn crawl(
        &self,
        start: &str,
        intent: &Intent,
        token: &CancellationToken,
    ) -> Vec<PageReport> {
        let mut reports = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, u32)> = VecDeque::new();
        let mut listing_pages = 0u32;
        let mut collected = 0usize;

        queue.push_back((start.to_string(), 0));
        while let Some((url, depth)) = queue.pop_front() {
            if intent.max_items.is_some_and(|max| collected >= max) {
                break;
            }
            let key = normalize_url(&url).map(|u| u.to_string()).unwrap_or_else(|_| url.clone());
            if !visited.insert(key) {
                continue;
            }
            if depth == 0 {
                if listing_pages >= self.limits.max_pages {
                    continue;
                }
                listing_pages += 1;
            }

            let report = self.process_page_cancellable(&url, intent, token).await;
            if let Some(final_url) = &report.final_url {
                visited.insert(final_url.to_string());
            }
            collected += report.records.len();

            if report.is_success() {
                if depth < self.limits.max_depth {
                    for link in &report.navigation.detail_links {
                        queue.push_back((link.to_string(), depth + 1));
                    }
                }
                if depth == 0 {
                    if let Some(next) = &report.navigation.next_page {
                        queue.push_front((next.to_string(), 0));
                    }
                }
            }
            let cancelled = matches!(report.error, Some(PipelineError::Cancelled));
            reports.push(report);
            if cancelled {
                break;
            }
        }
        reports
    }

    /// Release browser processes and sessions.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::reasoning::{MockModelClient, ScriptedModelClient};
    use crate::renderer::{BackendError, LoadedPage, RenderBackend};
    use async_trait::async_trait;
    use smartspider::{FieldRule, Strategy};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves canned pages by URL.
    struct Pages(HashMap<String, String>);

    #[async_trait]
    impl RenderBackend for Pages {
        fn mode(&self) -> RenderMode {
            RenderMode::Static
        }

        async fn load(&self, url: &Url, _timeout: Duration) -> Result<LoadedPage, BackendError> {
            self.0
                .get(url.as_str())
                .map(|content| LoadedPage {
                    final_url: url.clone(),
                    content: content.clone(),
                })
                .ok_or_else(|| BackendError::Transport("404".into()))
        }
    }

    /// Browser stand-in serving one fixed page and counting loads.
    struct Browser {
        content: String,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl RenderBackend for Browser {
        fn mode(&self) -> RenderMode {
            RenderMode::Playwright
        }

        async fn load(&self, url: &Url, _timeout: Duration) -> Result<LoadedPage, BackendError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(LoadedPage {
                final_url: url.clone(),
                content: self.content.clone(),
            })
        }
    }

    fn article(title: &str) -> String {
        let body: String = (0..12)
            .map(|i| format!("<p>{title} paragraph {i} with enough words to read as a real article.</p>"))
            .collect();
        format!("<html><head><title>{title}</title></head><body><h1>{title}</h1><time>2024-05-01</time>{body}</body></html>")
    }

    fn pipeline(pages: &[(&str, String)]) -> Pipeline {
        let backend = Pages(pages.iter().map(|(u, c)| (u.to_string(), c.clone())).collect());
        let engine = RenderEngine::new(vec![Arc::new(backend)], Duration::from_secs(5), true);
        let reasoner = Reasoner::new(Arc::new(MockModelClient::new()), RetryPolicy::immediate(1));
        Pipeline::new(Arc::new(engine), reasoner, &Settings::default())
    }

    #[tokio::test]
    async fn test_page_reaches_recorded_and_reuses_strategy() {
        let p = pipeline(&[
            ("https://news.example.com/a", article("Alpha")),
            ("https://news.example.com/b", article("Beta")),
        ]);
        let intent = p.parse_intent("title and content").await.unwrap();

        let first = p.process_page("https://news.example.com/a", &intent).await;
        assert!(first.is_success(), "{:?}", first.error);
        assert_eq!(first.page_type, Some(PageType::News));
        assert!(!first.strategy_cached);
        assert_eq!(first.records[0].text("title"), Some("Alpha"));

        let second = p.process_page("https://news.example.com/b", &intent).await;
        assert!(second.strategy_cached);
        assert_eq!(second.records[0].text("title"), Some("Beta"));
        assert_eq!(p.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_keeps_order_and_isolates_failures() {
        let p = pipeline(&[("https://news.example.com/a", article("Alpha"))]);
        let urls = vec![
            "https://news.example.com/missing".to_string(),
            "https://news.example.com/a".to_string(),
        ];
        let batch = p.run_batch(&urls, "titles", CancellationToken::new()).await.unwrap();

        assert_eq!(batch.pages.len(), 2);
        assert_eq!(batch.pages[0].url, urls[0]);
        assert_eq!(batch.pages[0].state, PageState::Pending);
        assert_eq!(batch.pages[0].error.as_ref().map(|e| e.kind()), Some("fetch_failure"));
        assert!(batch.pages[1].is_success());
        assert_eq!(batch.succeeded(), 1);
        assert_eq!(batch.failed(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_batch_reports_cancelled_pages() {
        let p = pipeline(&[("https://news.example.com/a", article("Alpha"))]);
        let token = CancellationToken::new();
        token.cancel();
        let batch = p
            .run_batch(&["https://news.example.com/a".to_string()], "titles", token)
            .await
            .unwrap();
        assert_eq!(batch.pages[0].error.as_ref().map(|e| e.kind()), Some("cancelled"));
        assert!(p.cache().is_empty());
    }

    #[tokio::test]
    async fn test_schema_failure_reports_typed_stage() {
        let backend = Pages(
            [("https://x.example.com/".to_string(), article("X"))]
                .into_iter()
                .collect(),
        );
        let engine = RenderEngine::new(vec![Arc::new(backend)], Duration::from_secs(5), true);
        let client = Arc::new(ScriptedModelClient::new([
            r#"{"page_type": "news", "confidence": 0.9}"#,
            "not json",
            "still not json",
        ]));
        let reasoner = Reasoner::new(client, RetryPolicy::immediate(1));
        let p = Pipeline::new(Arc::new(engine), reasoner, &Settings::default());

        let intent = smartspider::Intent {
            intent_type: smartspider::IntentType::ExtractInfo,
            fields: vec![smartspider::FieldSpec::new("title")],
            scope: None,
            max_items: None,
            raw_text: "title".into(),
        };
        let report = p.process_page("https://x.example.com/", &intent).await;
        assert_eq!(report.state, PageState::IntentBound);
        match report.error {
            Some(PipelineError::SchemaValidation(e)) => {
                assert_eq!(e.schema, "strategy");
                assert_eq!(e.raw_response, "still not json");
            }
            other => panic!("expected schema error, got {other:?}"),
        }
        assert!(p.cache().is_empty());
    }

    #[tokio::test]
    async fn test_crawl_follows_pagination_and_details() {
        let listing = |next: &str| {
            format!(
                "<html><head><title>TEST_PAGE_TYPE:list</title></head><body>{}<a class=\"next\" href=\"{next}\">next</a></body></html>",
                "<ul class=\"list\"><li><a href=\"/d/1\">one</a></li><li><a href=\"/d/2\">two</a></li></ul>"
            )
        };
        let p = pipeline(&[
            ("https://shop.example.com/list", listing("/list?page=2")),
            ("https://shop.example.com/list?page=2", listing("/list?page=3")),
            ("https://shop.example.com/list?page=3", listing("/list?page=4")),
            ("https://shop.example.com/d/1", article("One")),
            ("https://shop.example.com/d/2", article("Two")),
        ]);
        let intent = p.parse_intent("titles").await.unwrap();
        let reports = p
            .crawl("https://shop.example.com/list", &intent, &CancellationToken::new())
            .await;

        let urls: Vec<&str> = reports.iter().map(|r| r.url.as_str()).collect();
        // Settings::default(): three listing pages, detail pages once each.
        assert_eq!(
            urls,
            vec![
                "https://shop.example.com/list",
                "https://shop.example.com/list?page=2",
                "https://shop.example.com/list?page=3",
                "https://shop.example.com/d/1",
                "https://shop.example.com/d/2",
            ]
        );
    }

    fn escalating_pipeline(pages: &[(&str, String)], browser: Arc<Browser>) -> Pipeline {
        let backend = Pages(pages.iter().map(|(u, c)| (u.to_string(), c.clone())).collect());
        let backends: Vec<Arc<dyn RenderBackend>> = vec![Arc::new(backend), browser];
        let engine = RenderEngine::new(backends, Duration::from_secs(5), true);
        let reasoner = Reasoner::new(Arc::new(MockModelClient::new()), RetryPolicy::immediate(1));
        let p = Pipeline::new(Arc::new(engine), reasoner, &Settings::default());
        p.cache().insert(
            "shop.example.com",
            PageType::List,
            Strategy::new(PageType::List).with_field(FieldRule::new("name", ".card h2").required()),
        );
        p
    }

    #[tokio::test]
    async fn test_listing_requirements_do_not_escalate_other_page_types() {
        let browser = Arc::new(Browser {
            content: article("Rendered"),
            loads: AtomicUsize::new(0),
        });
        let p = escalating_pipeline(
            &[("https://shop.example.com/news/launch", article("Launch"))],
            browser.clone(),
        );
        let intent = p.parse_intent("title and content").await.unwrap();

        let report = p.process_page("https://shop.example.com/news/launch", &intent).await;
        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(report.page_type, Some(PageType::News));
        assert_eq!(report.render_mode, Some(RenderMode::Static));
        assert!(!report.degraded);
        assert_eq!(browser.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_listing_requirements_escalate_listing_pages() {
        let cards: String = (0..4)
            .map(|i| format!("<div class=\"card\"><h2>Kettle {i}</h2></div>"))
            .collect();
        let browser = Arc::new(Browser {
            content: format!("<html><head><title>TEST_PAGE_TYPE:list</title></head><body>{cards}</body></html>"),
            loads: AtomicUsize::new(0),
        });
        // The static copy is a complete article but has no `.card h2`.
        let p = escalating_pipeline(
            &[("https://shop.example.com/category/kettles", article("Kettles"))],
            browser.clone(),
        );
        let intent = p.parse_intent("names").await.unwrap();

        let report = p.process_page("https://shop.example.com/category/kettles", &intent).await;
        assert_eq!(report.render_mode, Some(RenderMode::Playwright));
        assert_eq!(browser.loads.load(Ordering::SeqCst), 1);
    }
}
