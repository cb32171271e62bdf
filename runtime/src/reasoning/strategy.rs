// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Strategy building.
//!
//! A deterministic default plan, derived from the page typing, the intent and
//! the DOM summary, is laid underneath the model's reply before validation.
//! Model values win key by key; `null` from the model means "no opinion".

use super::ask::Reasoner;
use super::prompts;
use crate::extraction::DomSummary;
use serde_json::{json, Map, Value};
use smartspider::{Intent, PageType, PageTyping, ReasoningError, Strategy};
use tracing::debug;

const DEFAULT_FIELD_SELECTORS: &[(&str, &str)] = &[
    ("title", "article h1, h1, h2, .title"),
    ("content", "article, .article, #content"),
    ("date", "time, .date, .pub-date"),
    ("author", ".author, [itemprop='author']"),
    ("price", ".price, [itemprop='price']"),
    ("images", ".gallery img, img"),
];

const FALLBACK_FIELD_SELECTORS: &[(&str, &str)] = &[
    ("title", "meta[property='og:title'], meta[name='title'], title"),
    ("content", "meta[property='og:description'], .article-content"),
    ("date", "meta[property='article:published_time'], meta[name='pubdate']"),
];

const DEFAULT_ITEM_LINKS: &str = ".list a, .post a";
const DEFAULT_PAGINATION: &str = ".pagination a.next, a.next, a[rel='next']";
const DEFAULT_IMAGES: &str = ".gallery img, img";

/// `li` count above which a page is treated as a list.
const LIST_LI_THRESHOLD: usize = 10;
/// `img` count above which a page is treated as a gallery.
const GALLERY_IMG_THRESHOLD: usize = 5;

pub struct StrategyBuilder {
    reasoner: Reasoner,
    max_pages: u32,
    max_depth: u32,
}

impl StrategyBuilder {
    pub fn new(reasoner: Reasoner) -> Self {
        Self {
            reasoner,
            max_pages: 3,
            max_depth: 2,
        }
    }

    /// Crawl limits used by the default plan for list pages.
    pub fn with_limits(mut self, max_pages: u32, max_depth: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self.max_depth = max_depth.max(1);
        self
    }

    pub async fn build(
        &self,
        typing: &PageTyping,
        intent: &Intent,
        summary: &DomSummary,
    ) -> Result<Strategy, ReasoningError> {
        let defaults = self.default_plan(typing, intent, summary);
        let prompt = prompts::strategy(typing, intent, &summary.to_json());
        let mut strategy: Strategy = self
            .reasoner
            .ask_with(&prompt, |reply| finalize(merge(defaults.clone(), reply), intent))
            .await?;
        strategy.page_type = typing.page_type;
        debug!(
            page_type = strategy.page_type.as_str(),
            fields = strategy.fields.len(),
            is_list = strategy.is_list,
            "strategy built"
        );
        Ok(strategy)
    }

    /// The plan used when the model has no opinion, in reply shape.
    pub fn default_plan(&self, typing: &PageTyping, intent: &Intent, summary: &DomSummary) -> Value {
        let requested: Vec<&str> = if !intent.fields.is_empty() {
            intent.field_names()
        } else if !typing.suggested_fields.is_empty() {
            typing.suggested_fields.iter().map(String::as_str).collect()
        } else {
            vec!["title", "content"]
        };

        let mut selectors = Map::new();
        for field in requested {
            if let Some((_, selector)) = DEFAULT_FIELD_SELECTORS.iter().find(|(f, _)| *f == field) {
                selectors.insert(field.to_string(), json!(selector));
            }
        }
        let fallbacks: Map<String, Value> = FALLBACK_FIELD_SELECTORS
            .iter()
            .map(|(f, s)| (f.to_string(), json!(s)))
            .collect();

        let is_list = typing.page_type == PageType::List
            || summary.tag_count("li") > LIST_LI_THRESHOLD;
        let is_gallery = typing.page_type == PageType::Gallery
            || summary.tag_count("img") > GALLERY_IMG_THRESHOLD;

        let item_links = is_list.then(|| match summary.repeating_blocks.first() {
            Some(block) => format!("{} a", block.selector),
            None => DEFAULT_ITEM_LINKS.to_string(),
        });

        json!({
            "page_type": typing.page_type.as_str(),
            "field_selectors": selectors,
            "is_list": is_list,
            "item_link_selector": item_links,
            "pagination_selector": is_list.then_some(DEFAULT_PAGINATION),
            "max_pages": self.max_pages,
            "max_depth": if is_list { self.max_depth } else { 1 },
            "image_selector": is_gallery.then_some(DEFAULT_IMAGES),
            "fallbacks": { "field_selectors": fallbacks },
        })
    }
}

/// Deep-merge `reply` over `base`. Objects merge key by key; `null` in the
/// reply keeps the base value; anything else replaces it.
pub fn merge(base: Value, reply: Value) -> Value {
    match (base, reply) {
        (Value::Object(mut base), Value::Object(reply)) => {
            for (key, value) in reply {
                let merged = match base.remove(&key) {
                    Some(existing) => merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (base, Value::Null) => base,
        (_, reply) => reply,
    }
}

fn is_link_field(name: &str) -> bool {
    matches!(name, "link" | "links" | "url" | "href") || name.ends_with("_link") || name.ends_with("_url")
}

fn is_image_field(name: &str) -> bool {
    matches!(name, "image" | "images" | "img" | "photo" | "photos" | "cover" | "thumbnail")
        || name.ends_with("_image")
}

/// Method and type defaults applied after merging: link fields read `href`,
/// image fields read `src` (as a list on non-list pages for plural names),
/// intent kinds fill `field_types`, and the intent's fields become required
/// unless the reply names its own.
fn finalize(mut plan: Value, intent: &Intent) -> Value {
    let Some(obj) = plan.as_object_mut() else {
        return plan;
    };
    let names: Vec<String> = obj
        .get("field_selectors")
        .and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();
    let is_list = obj.get("is_list").and_then(Value::as_bool).unwrap_or(false);

    let mut methods = match obj.remove("field_methods") {
        Some(Value::Object(m)) => m,
        Some(other) => {
            // Leave malformed values for the validator to report.
            obj.insert("field_methods".into(), other);
            return plan;
        }
        None => Map::new(),
    };
    for name in &names {
        let current = methods.get(name).and_then(Value::as_str).unwrap_or("");
        let plain = matches!(current.trim().to_ascii_lowercase().as_str(), "" | "css" | "text");
        if !plain {
            continue;
        }
        let plural = name.ends_with('s');
        let method = if is_link_field(name) {
            if plural && !is_list { "list:attr:href" } else { "attr:href" }
        } else if is_image_field(name) {
            if plural && !is_list { "list:attr:src" } else { "attr:src" }
        } else {
            continue;
        };
        methods.insert(name.clone(), json!(method));
    }
    obj.insert("field_methods".into(), Value::Object(methods));

    if let Value::Object(types) = obj
        .entry("field_types")
        .or_insert_with(|| Value::Object(Map::new()))
    {
        for spec in &intent.fields {
            if let Some(kind) = spec.kind.filter(|_| names.contains(&spec.name)) {
                types
                    .entry(spec.name.clone())
                    .or_insert_with(|| json!(kind.as_str()));
            }
        }
    }

    let has_required = obj
        .get("required_fields")
        .is_some_and(|v| v.as_array().is_some_and(|a| !a.is_empty()));
    if !has_required {
        let required: Vec<&str> = intent
            .field_names()
            .into_iter()
            .filter(|f| names.iter().any(|n| n == f))
            .collect();
        obj.insert("required_fields".into(), json!(required));
    }
    plan
}
