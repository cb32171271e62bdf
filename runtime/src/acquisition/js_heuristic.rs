// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dynamic-content heuristic: decides whether fetched markup is usable as-is
//! or needs a JavaScript-executing backend.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::sync::LazyLock;

/// Markup shorter than this is never trusted.
pub const MIN_CONTENT_CHARS: usize = 800;
/// Visible text below this is "sparse" when the markup itself is large.
pub const MIN_VISIBLE_TEXT_CHARS: usize = 200;
pub const LARGE_MARKUP_BYTES: usize = 10_000;
/// Inline script payload that, next to an empty root container, marks an SPA shell.
pub const SPA_SCRIPT_BYTES: usize = 10_000;

static SCRIPT_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<script\b").expect("script regex is valid"));
static TEXT_BLOCK_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:p|article|section|li)[\s>/]").expect("block regex is valid"));
static VAR_DECL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bvar\s").expect("var regex is valid"));

const SPA_ROOTS: &str =
    "#root, #app, #__next, #__nuxt, #___gatsby, [data-reactroot], app-root, [ng-app]";
const NON_VISIBLE: [&str; 5] = ["script", "style", "noscript", "template", "svg"];

/// One reason the content looks JS-dependent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Empty,
    TooShort { chars: usize },
    /// Little visible text inside large markup.
    SparseText { text_chars: usize, markup_bytes: usize },
    /// Empty application root plus a large script payload.
    SpaRoot { script_bytes: usize },
    /// The page asks the reader to enable JavaScript.
    JsNotice,
    /// Scripts dominate the text blocks.
    ScriptHeavy { scripts: usize, text_blocks: usize },
    /// A selector the pending strategy needs matches nothing.
    MissingRequired { selector: String },
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Empty => f.write_str("empty"),
            Signal::TooShort { chars } => write!(f, "too_short({chars})"),
            Signal::SparseText {
                text_chars,
                markup_bytes,
            } => write!(f, "sparse_text({text_chars}/{markup_bytes})"),
            Signal::SpaRoot { script_bytes } => write!(f, "spa_root(script={script_bytes})"),
            Signal::JsNotice => f.write_str("js_notice"),
            Signal::ScriptHeavy {
                scripts,
                text_blocks,
            } => write!(f, "script_heavy({scripts}/{text_blocks})"),
            Signal::MissingRequired { selector } => write!(f, "missing_required({selector})"),
        }
    }
}

/// Result of inspecting one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub signals: Vec<Signal>,
}

impl Verdict {
    pub fn needs_render(&self) -> bool {
        !self.signals.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.signals.iter().map(|s| s.to_string()).collect()
    }
}

/// Inspect markup. `required` lists selectors the caller's strategy needs;
/// unparsable selectors are skipped.
pub fn inspect(content: &str, required: &[&str]) -> Verdict {
    let mut signals = Vec::new();
    let sample = content.trim();
    if sample.is_empty() {
        signals.push(Signal::Empty);
        return Verdict { signals };
    }

    let chars = sample.chars().count();
    if chars < MIN_CONTENT_CHARS {
        signals.push(Signal::TooShort { chars });
    }

    let lowered = sample.to_lowercase();
    if lowered.contains("enable javascript")
        || lowered.contains("requires javascript")
        || lowered.contains("javascript is required")
    {
        signals.push(Signal::JsNotice);
    }

    let scripts = SCRIPT_TAG.find_iter(&lowered).count();
    let text_blocks = TEXT_BLOCK_TAG.find_iter(&lowered).count();
    let heavy = (text_blocks == 0 && scripts > 0)
        || (scripts >= 15 && scripts > text_blocks * 2)
        || (VAR_DECL.find_iter(&lowered).count() > 50 && text_blocks < 3);
    if heavy {
        signals.push(Signal::ScriptHeavy {
            scripts,
            text_blocks,
        });
    }

    let doc = Html::parse_document(content);
    let text_chars = visible_text_chars(&doc);
    if text_chars < MIN_VISIBLE_TEXT_CHARS && sample.len() >= LARGE_MARKUP_BYTES {
        signals.push(Signal::SparseText {
            text_chars,
            markup_bytes: sample.len(),
        });
    }

    let script_bytes = inline_script_bytes(&doc);
    if script_bytes >= SPA_SCRIPT_BYTES && (text_chars == 0 || has_empty_app_root(&doc)) {
        signals.push(Signal::SpaRoot { script_bytes });
    }

    for selector in required {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        if doc.select(&parsed).next().is_none() {
            signals.push(Signal::MissingRequired {
                selector: selector.to_string(),
            });
        }
    }

    Verdict { signals }
}

fn body_or_root(doc: &Html) -> ElementRef<'_> {
    Selector::parse("body")
        .ok()
        .and_then(|sel| doc.select(&sel).next())
        .unwrap_or_else(|| doc.root_element())
}

/// Visible text length of an element, skipping script-like subtrees.
pub(crate) fn element_text_chars(element: ElementRef<'_>) -> usize {
    element
        .descendants()
        .filter_map(|node| node.value().as_text().map(|t| (node, t)))
        .filter(|(node, _)| {
            !node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| NON_VISIBLE.contains(&e.name()))
            })
        })
        .map(|(_, text)| text.trim().chars().count())
        .sum()
}

fn visible_text_chars(doc: &Html) -> usize {
    element_text_chars(body_or_root(doc))
}

fn inline_script_bytes(doc: &Html) -> usize {
    let Ok(sel) = Selector::parse("script") else {
        return 0;
    };
    doc.select(&sel)
        .map(|s| s.text().map(str::len).sum::<usize>())
        .sum()
}

fn has_empty_app_root(doc: &Html) -> bool {
    let Ok(sel) = Selector::parse(SPA_ROOTS) else {
        return false;
    };
    doc.select(&sel).any(|root| element_text_chars(root) < 20)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_page() -> String {
        let paragraphs: String = (0..12)
            .map(|i| format!("<p>Paragraph {i} of a perfectly ordinary server-rendered article body.</p>\n"))
            .collect();
        format!(
            "<html><head><title>News</title><script src=\"/a.js\"></script></head>\
             <body><article><h1>Headline</h1>{paragraphs}</article></body></html>"
        )
    }

    #[test]
    fn test_server_rendered_article_is_accepted() {
        let verdict = inspect(&article_page(), &[]);
        assert!(!verdict.needs_render(), "{:?}", verdict.signals);
    }

    #[test]
    fn test_empty_body_with_large_inline_script_escalates() {
        let payload = "x".repeat(50 * 1024);
        let html = format!(
            "<html><head><script>window.__STATE__=\"{payload}\";</script></head><body></body></html>"
        );
        let verdict = inspect(&html, &[]);
        assert!(verdict
            .signals
            .iter()
            .any(|s| matches!(s, Signal::SpaRoot { script_bytes } if *script_bytes > 50_000)));
        assert!(verdict
            .signals
            .iter()
            .any(|s| matches!(s, Signal::SparseText { .. })));
    }

    #[test]
    fn test_empty_react_root_escalates() {
        let bundle = "function f(){return 1}".repeat(600);
        let filler = "<meta name=\"x\" content=\"padding\">".repeat(30);
        let html = format!(
            "<html><head>{filler}</head><body><nav><p>Menu</p></nav><div id=\"root\"></div>\
             <script>{bundle}</script></body></html>"
        );
        let verdict = inspect(&html, &[]);
        assert!(verdict
            .signals
            .iter()
            .any(|s| matches!(s, Signal::SpaRoot { .. })));
    }

    #[test]
    fn test_short_and_empty_content() {
        assert_eq!(inspect("   ", &[]).signals, vec![Signal::Empty]);
        let verdict = inspect("<html><body><p>tiny</p></body></html>", &[]);
        assert!(matches!(verdict.signals[0], Signal::TooShort { .. }));
    }

    #[test]
    fn test_javascript_notice() {
        let html = format!(
            "{}<noscript>Please enable JavaScript to continue.</noscript>",
            article_page()
        );
        assert_eq!(inspect(&html, &[]).signals, vec![Signal::JsNotice]);
    }

    #[test]
    fn test_missing_required_selector() {
        let verdict = inspect(&article_page(), &["article h1", ".price", "div[["]);
        assert_eq!(
            verdict.signals,
            vec![Signal::MissingRequired {
                selector: ".price".into()
            }]
        );
        assert_eq!(verdict.labels(), vec!["missing_required(.price)"]);
    }
}
