// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! DOM-side work: summarizing pages for the reasoning layer and executing
//! validated strategies against them.
//!
//! `scraper::Html` is `!Send`, so everything here is synchronous and parses
//! the page itself; callers hold only owned results across `.await` points.

pub mod dom_summary;
pub mod executor;

pub use dom_summary::{DomSummarizer, DomSummary};
pub use executor::{execute, Execution, Navigation};

use scraper::ElementRef;

/// Elements whose text is never shown to a reader.
const HIDDEN_TAGS: [&str; 6] = ["script", "style", "noscript", "iframe", "svg", "template"];

pub(crate) fn is_hidden_tag(name: &str) -> bool {
    HIDDEN_TAGS.contains(&name)
}

/// Whether the element or any ancestor is a hidden tag.
pub(crate) fn in_hidden_subtree(element: ElementRef<'_>) -> bool {
    is_hidden_tag(element.value().name())
        || element.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| is_hidden_tag(e.name()))
        })
}

/// Visible text of an element with whitespace collapsed.
pub(crate) fn clean_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| is_hidden_tag(e.name()))
        });
        if hidden {
            continue;
        }
        for word in text.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}

/// First `max` characters of `text`.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
