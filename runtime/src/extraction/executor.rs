// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Strategy executor.
//!
//! Applies a validated [`Strategy`] to a page and produces records plus the
//! navigation URLs an outer crawl loop may follow. Execution is a pure
//! function of `(final_url, strategy, content)`: no I/O, no shared state,
//! same inputs give the same records in the same order.
//!
//! Every `href`/`src` value (and every field typed `url`) is resolved against
//! the page's final URL, never the URL originally requested.

use super::clean_text;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use smartspider::{ExecutionError, ExtractMode, FieldKind, FieldRule, FieldValue, Record, Strategy};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("number regex is valid"));

/// Attributes whose values are URLs.
const URL_ATTRS: [&str; 6] = ["href", "src", "data-src", "data-original", "poster", "action"];

/// Follow-up URLs discovered on the page, already absolute and de-duplicated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Navigation {
    pub next_page: Option<Url>,
    pub detail_links: Vec<Url>,
}

/// Output of one execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Execution {
    pub records: Vec<Record>,
    pub navigation: Navigation,
}

struct CompiledRule<'s> {
    rule: &'s FieldRule,
    selector: Selector,
    fallback: Option<Selector>,
}

fn compile(css: &str) -> Result<Selector, ExecutionError> {
    Selector::parse(css).map_err(|e| ExecutionError {
        selector: css.to_string(),
        reason: format!("{e:?}"),
    })
}

fn compile_opt(css: Option<&str>) -> Result<Option<Selector>, ExecutionError> {
    css.map(compile).transpose()
}

/// Execute `strategy` against `content` served from `final_url`.
///
/// `max_items` caps both emitted records and detail links.
pub fn execute(
    final_url: &Url,
    strategy: &Strategy,
    content: &str,
    max_items: Option<usize>,
) -> Result<Execution, ExecutionError> {
    let rules = strategy
        .fields
        .iter()
        .map(|rule| {
            Ok(CompiledRule {
                rule,
                selector: compile(&rule.selector)?,
                fallback: compile_opt(rule.fallback.as_deref())?,
            })
        })
        .collect::<Result<Vec<_>, ExecutionError>>()?;
    let item_links = compile_opt(strategy.item_link_selector.as_deref())?;
    let pagination = compile_opt(strategy.pagination_selector.as_deref())?;
    let images = compile_opt(strategy.image_selector.as_deref())?;

    let doc = Html::parse_document(content);
    let ctx = Context { base: final_url };

    // Page-level values, one per non-repeating field.
    let mut page_values: Vec<(usize, FieldValue)> = Vec::new();
    // Columns of per-match values for repeating fields.
    let mut columns: Vec<(usize, Vec<Option<FieldValue>>)> = Vec::new();

    for (index, compiled) in rules.iter().enumerate() {
        let rule = compiled.rule;
        if rule.repeating && !rule.mode.is_list() {
            let column: Vec<Option<FieldValue>> = doc
                .select(&compiled.selector)
                .take(rule.limit.unwrap_or(usize::MAX))
                .map(|el| ctx.scalar(el, &rule.mode, rule.kind))
                .collect();
            columns.push((index, column));
        } else {
            let mut value = ctx.page_value(&doc, &compiled.selector, rule);
            if value.is_none() {
                if let Some(fallback) = &compiled.fallback {
                    value = ctx.page_value(&doc, fallback, rule);
                }
            }
            if let Some(value) = value {
                page_values.push((index, value));
            }
        }
    }

    let image_list = images.map(|sel| {
        let mut seen = HashSet::new();
        let list: Vec<FieldValue> = doc
            .select(&sel)
            .filter_map(|img| {
                img.value()
                    .attr("src")
                    .or_else(|| img.value().attr("data-src"))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            })
            .map(|src| ctx.resolve(src))
            .filter(|src| seen.insert(src.clone()))
            .map(FieldValue::Text)
            .collect();
        list
    });

    let source_url = final_url.as_str();
    let row_count = columns.iter().map(|(_, c)| c.len()).max().unwrap_or(0);
    let mut records = Vec::new();

    if row_count == 0 {
        let mut record = Record::new(source_url, strategy.page_type);
        for (index, value) in &page_values {
            record.insert(rules[*index].rule.name.clone(), value.clone());
        }
        records.push(record);
    } else {
        for row in 0..row_count {
            let mut record = Record::new(source_url, strategy.page_type);
            for (index, compiled) in rules.iter().enumerate() {
                let cell = columns
                    .iter()
                    .find(|(i, _)| *i == index)
                    .and_then(|(_, column)| column.get(row).cloned().flatten())
                    .or_else(|| {
                        page_values
                            .iter()
                            .find(|(i, _)| *i == index)
                            .map(|(_, v)| v.clone())
                    });
                if let Some(value) = cell {
                    record.insert(compiled.rule.name.clone(), value);
                }
            }
            records.push(record);
        }
    }

    if let Some(list) = image_list.filter(|l| !l.is_empty()) {
        for record in &mut records {
            if record.get("images").is_none() {
                record.insert("images", FieldValue::List(list.clone()));
            }
        }
    }

    // Nothing matched: no blank rows.
    records.retain(|r| r.fields.values().any(|v| !v.is_empty()));
    let mut seen_records = HashSet::new();
    records.retain(|r| seen_records.insert(serde_json::to_string(&r.fields).unwrap_or_default()));
    if let Some(max) = max_items {
        records.truncate(max.max(1));
    }

    let navigation = Navigation {
        next_page: pagination.and_then(|sel| next_page(&doc, &sel, &ctx)),
        detail_links: item_links
            .map(|sel| detail_links(&doc, &sel, &ctx, max_items))
            .unwrap_or_default(),
    };

    Ok(Execution {
        records,
        navigation,
    })
}

fn next_page(doc: &Html, selector: &Selector, ctx: &Context<'_>) -> Option<Url> {
    doc.select(selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| ctx.follow_up(href))
        .find(|url| !same_page(url, ctx.base))
}

fn detail_links(
    doc: &Html,
    selector: &Selector,
    ctx: &Context<'_>,
    max_items: Option<usize>,
) -> Vec<Url> {
    let mut seen = HashSet::new();
    doc.select(selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| ctx.follow_up(href))
        .filter(|url| !same_page(url, ctx.base))
        .filter(|url| seen.insert(url.as_str().to_string()))
        .take(max_items.unwrap_or(usize::MAX))
        .collect()
}

/// Same document, ignoring the fragment.
fn same_page(a: &Url, b: &Url) -> bool {
    let mut a = a.clone();
    let mut b = b.clone();
    a.set_fragment(None);
    b.set_fragment(None);
    a == b
}

struct Context<'u> {
    base: &'u Url,
}

impl Context<'_> {
    fn resolve(&self, raw: &str) -> String {
        self.base
            .join(raw)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| raw.to_string())
    }

    /// Absolute http(s) URL for navigation, or `None` for `javascript:`,
    /// `mailto:` and unparsable values.
    fn follow_up(&self, href: &str) -> Option<Url> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }
        let url = self.base.join(href).ok()?;
        matches!(url.scheme(), "http" | "https").then_some(url)
    }

    /// Raw string value of one element under `mode`.
    fn raw(&self, el: ElementRef<'_>, mode: &ExtractMode) -> Option<String> {
        let is_meta = el.value().name() == "meta";
        let value = match mode.attr() {
            Some(attr) => {
                let v = el
                    .value()
                    .attr(attr)
                    .or_else(|| is_meta.then(|| el.value().attr("content")).flatten())?;
                let v = v.trim();
                if URL_ATTRS.contains(&attr) && !v.is_empty() {
                    self.resolve(v)
                } else {
                    v.to_string()
                }
            }
            None if is_meta => el.value().attr("content")?.trim().to_string(),
            None => clean_text(el),
        };
        (!value.is_empty()).then_some(value)
    }

    fn typed(&self, raw: String, kind: Option<FieldKind>) -> FieldValue {
        match kind {
            Some(FieldKind::Number) => parse_number(&raw)
                .map(FieldValue::Number)
                .unwrap_or(FieldValue::Text(raw)),
            Some(FieldKind::Url) => FieldValue::Text(self.resolve(&raw)),
            _ => FieldValue::Text(raw),
        }
    }

    fn scalar(&self, el: ElementRef<'_>, mode: &ExtractMode, kind: Option<FieldKind>) -> Option<FieldValue> {
        self.raw(el, mode).map(|raw| self.typed(raw, kind))
    }

    /// Page-level value: first non-empty match, or every match for list modes.
    fn page_value(&self, doc: &Html, selector: &Selector, rule: &FieldRule) -> Option<FieldValue> {
        if rule.mode.is_list() {
            let items: Vec<FieldValue> = doc
                .select(selector)
                .filter_map(|el| self.scalar(el, &rule.mode, rule.kind))
                .take(rule.limit.unwrap_or(usize::MAX))
                .collect();
            return (!items.is_empty()).then_some(FieldValue::List(items));
        }
        doc.select(selector)
            .find_map(|el| self.scalar(el, &rule.mode, rule.kind))
    }
}

fn parse_number(text: &str) -> Option<f64> {
    NUMBER
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
}
