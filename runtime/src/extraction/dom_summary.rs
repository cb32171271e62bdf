// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Compact, size-bounded structural digest of a page for the reasoning layer.
//!
//! Deterministic: identical markup always yields an identical summary, and
//! the JSON form has a stable key order.

use super::{clean_text, in_hidden_subtree, truncate_chars};
use indexmap::IndexMap;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

const STRUCTURE_KEYWORDS: [&str; 7] = ["content", "article", "post", "body", "detail", "news", "main"];
const COUNTED_TAGS: [&str; 7] = ["div", "article", "section", "li", "img", "a", "table"];
const MAX_STRUCTURE_HINTS: usize = 10;
const MAX_IMAGE_HINTS: usize = 15;
const MAX_LIST_ITEMS: usize = 10;
const MAX_REPEATING_BLOCKS: usize = 10;
const MIN_REPEATS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetaSummary {
    pub description: String,
    pub keywords: String,
}

/// A container whose class or id suggests main content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureHint {
    pub tag: String,
    pub class: String,
    pub id: String,
    pub text_snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkSummary {
    pub href: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListSummary {
    #[serde(rename = "type")]
    pub kind: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageHint {
    pub order: usize,
    pub src_preview: String,
    pub parent_tag: String,
    pub parent_class: String,
    pub ancestor_chain: Vec<String>,
    pub context_text: String,
}

/// Sibling elements sharing tag and class: candidate list items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatingBlock {
    /// CSS selector matching the group.
    pub selector: String,
    pub count: usize,
    pub sample_text: String,
}

/// The digest itself. Field order is the serialized key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DomSummary {
    pub title: String,
    pub meta: MetaSummary,
    pub structure_hints: Vec<StructureHint>,
    pub headings: Vec<String>,
    pub paragraphs: Vec<String>,
    pub links: Vec<LinkSummary>,
    pub lists: Vec<ListSummary>,
    pub tag_counts: BTreeMap<String, usize>,
    pub image_hints: Vec<ImageHint>,
    pub repeating_blocks: Vec<RepeatingBlock>,
}

impl DomSummary {
    /// Compact JSON, as embedded in prompts.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn tag_count(&self, tag: &str) -> usize {
        self.tag_counts.get(tag).copied().unwrap_or(0)
    }
}

/// Builds [`DomSummary`] values under fixed size limits.
#[derive(Debug, Clone)]
pub struct DomSummarizer {
    pub max_text_nodes: usize,
    pub max_links: usize,
    pub max_lists: usize,
}

impl Default for DomSummarizer {
    fn default() -> Self {
        Self {
            max_text_nodes: 150,
            max_links: 100,
            max_lists: 20,
        }
    }
}

fn sel(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn select_visible<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match sel(css) {
        Some(selector) => doc
            .select(&selector)
            .filter(|e| !in_hidden_subtree(*e))
            .collect(),
        None => Vec::new(),
    }
}

fn class_of(element: ElementRef<'_>) -> String {
    element.value().classes().collect::<Vec<_>>().join(" ")
}

impl DomSummarizer {
    pub fn summarize(&self, html: &str) -> DomSummary {
        let doc = Html::parse_document(html);

        let title = select_visible(&doc, "title")
            .first()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        DomSummary {
            title,
            meta: self.meta(&doc),
            structure_hints: self.structure_hints(&doc),
            headings: self.texts(&doc, "h1, h2, h3", (self.max_text_nodes / 3).max(1)),
            paragraphs: self.texts(&doc, "p", self.max_text_nodes),
            links: self.links(&doc),
            lists: self.lists(&doc),
            tag_counts: self.tag_counts(&doc),
            image_hints: self.image_hints(&doc),
            repeating_blocks: self.repeating_blocks(&doc),
        }
    }

    fn meta(&self, doc: &Html) -> MetaSummary {
        let content_of = |css: &str| {
            sel(css)
                .and_then(|s| doc.select(&s).next())
                .and_then(|m| m.value().attr("content"))
                .map(|c| c.trim().to_string())
                .unwrap_or_default()
        };
        MetaSummary {
            description: content_of("meta[name='description']"),
            keywords: content_of("meta[name='keywords']"),
        }
    }

    fn structure_hints(&self, doc: &Html) -> Vec<StructureHint> {
        let mut hints = Vec::new();
        for element in select_visible(doc, "article, div, section, main") {
            let class = class_of(element);
            let id = element.value().id().unwrap_or_default().to_string();
            let combined = format!("{class} {id}").to_lowercase();
            if !STRUCTURE_KEYWORDS.iter().any(|k| combined.contains(k)) {
                continue;
            }
            let snippet = truncate_chars(&clean_text(element), 100);
            if snippet.chars().count() > 20 {
                hints.push(StructureHint {
                    tag: element.value().name().to_string(),
                    class,
                    id,
                    text_snippet: snippet,
                });
            }
            if hints.len() >= MAX_STRUCTURE_HINTS {
                break;
            }
        }
        hints
    }

    fn texts(&self, doc: &Html, css: &str, limit: usize) -> Vec<String> {
        select_visible(doc, css)
            .into_iter()
            .map(clean_text)
            .filter(|t| !t.is_empty())
            .take(limit)
            .collect()
    }

    fn links(&self, doc: &Html) -> Vec<LinkSummary> {
        select_visible(doc, "a")
            .into_iter()
            .filter_map(|a| {
                let href = a.value().attr("href").unwrap_or_default().trim().to_string();
                let text = clean_text(a);
                (!href.is_empty() || !text.is_empty()).then_some(LinkSummary { href, text })
            })
            .take(self.max_links)
            .collect()
    }

    fn lists(&self, doc: &Html) -> Vec<ListSummary> {
        let Some(li) = sel("li") else {
            return Vec::new();
        };
        select_visible(doc, "ul, ol")
            .into_iter()
            .filter_map(|list| {
                let items: Vec<String> = list
                    .select(&li)
                    .map(clean_text)
                    .filter(|t| !t.is_empty())
                    .take(MAX_LIST_ITEMS)
                    .collect();
                (!items.is_empty()).then(|| ListSummary {
                    kind: list.value().name().to_string(),
                    items,
                })
            })
            .take(self.max_lists)
            .collect()
    }

    fn tag_counts(&self, doc: &Html) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for tag in COUNTED_TAGS {
            let n = select_visible(doc, tag).len();
            if n > 0 {
                counts.insert(tag.to_string(), n);
            }
        }
        counts
    }

    fn image_hints(&self, doc: &Html) -> Vec<ImageHint> {
        let mut hints = Vec::new();
        let mut seen = HashSet::new();
        let Some(img) = sel("img") else {
            return hints;
        };

        let mut record = |image: ElementRef<'_>, context: Option<ElementRef<'_>>, hints: &mut Vec<ImageHint>| {
            let Some(src) = image.value().attr("src").filter(|s| !s.is_empty()) else {
                return;
            };
            if !seen.insert(src.to_string()) {
                return;
            }
            let parent = context.or_else(|| image.parent().and_then(ElementRef::wrap));
            hints.push(ImageHint {
                order: hints.len() + 1,
                src_preview: truncate_chars(src, 120),
                parent_tag: parent.map(|p| p.value().name().to_string()).unwrap_or_default(),
                parent_class: parent.map(class_of).unwrap_or_default(),
                ancestor_chain: ancestor_chain(image),
                context_text: parent
                    .map(|p| truncate_chars(&clean_text(p), 80))
                    .unwrap_or_default(),
            });
        };

        'containers: for container in select_visible(doc, "article, main, section") {
            for image in container.select(&img) {
                if hints.len() >= MAX_IMAGE_HINTS {
                    break 'containers;
                }
                record(image, Some(container), &mut hints);
            }
        }

        if hints.is_empty() {
            for image in select_visible(doc, "img") {
                if hints.len() >= MAX_IMAGE_HINTS {
                    break;
                }
                record(image, None, &mut hints);
            }
        }
        hints
    }

    fn repeating_blocks(&self, doc: &Html) -> Vec<RepeatingBlock> {
        let mut blocks: Vec<RepeatingBlock> = Vec::new();
        let mut seen_selectors = HashSet::new();

        for parent in select_visible(doc, "body *") {
            // Group element children by (tag, class list), in first-seen order.
            let mut groups: IndexMap<(String, String), Vec<ElementRef<'_>>> = IndexMap::new();
            for child in parent.children().filter_map(ElementRef::wrap) {
                let name = child.value().name();
                if super::is_hidden_tag(name) || matches!(name, "br" | "hr" | "option" | "meta" | "link") {
                    continue;
                }
                groups
                    .entry((name.to_string(), class_of(child)))
                    .or_default()
                    .push(child);
            }

            for ((tag, _), members) in groups {
                if members.len() < MIN_REPEATS {
                    continue;
                }
                let selector = group_selector(parent, members[0], &tag);
                if !seen_selectors.insert(selector.clone()) {
                    continue;
                }
                let sample_text = members
                    .iter()
                    .map(|m| clean_text(*m))
                    .find(|t| !t.is_empty())
                    .map(|t| truncate_chars(&t, 80))
                    .unwrap_or_default();
                blocks.push(RepeatingBlock {
                    selector,
                    count: members.len(),
                    sample_text,
                });
                if blocks.len() >= MAX_REPEATING_BLOCKS {
                    return blocks;
                }
            }
        }
        blocks
    }
}

/// Up to five enclosing tag names, nearest first, skipping html/body.
fn ancestor_chain(element: ElementRef<'_>) -> Vec<String> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .map(|a| a.value().name().to_string())
        .filter(|name| name != "html" && name != "body")
        .take(5)
        .collect()
}

fn is_plain_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '-')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Selector for a sibling group: `tag.class` when the member carries usable
/// classes, otherwise anchored on the parent (`#id > tag`, `ul.nav > li`).
fn group_selector(parent: ElementRef<'_>, member: ElementRef<'_>, tag: &str) -> String {
    let classes: Vec<&str> = member.value().classes().filter(|c| is_plain_ident(c)).collect();
    if !classes.is_empty() {
        return format!("{tag}.{}", classes.join("."));
    }
    let parent_tag = parent.value().name();
    if let Some(id) = parent.value().id().filter(|id| is_plain_ident(id)) {
        return format!("#{id} > {tag}");
    }
    let parent_classes: Vec<&str> = parent.value().classes().filter(|c| is_plain_ident(c)).collect();
    if parent_classes.is_empty() {
        format!("{parent_tag} > {tag}")
    } else {
        format!("{parent_tag}.{} > {tag}", parent_classes.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_include;
    use serde_json::json;

    const LISTING: &str = r#"<html><head><title> Latest News </title>
        <meta name="description" content=" Daily headlines ">
        <script>var tracking = "<p>not a paragraph</p>";</script></head>
        <body>
          <div class="main-content" id="news">
            <h1>Headlines</h1>
            <ul class="feed">
              <li class="item"><a href="/a/1">First story about things</a></li>
              <li class="item"><a href="/a/2">Second story about things</a></li>
              <li class="item"><a href="/a/3">Third story about things</a></li>
            </ul>
            <p>Updated hourly.</p>
          </div>
          <section><img src="/img/hero.jpg"><img src="/img/hero.jpg"></section>
        </body></html>"#;

    #[test]
    fn test_summary_shape() {
        let summary = DomSummarizer::default().summarize(LISTING);
        let value = serde_json::to_value(&summary).unwrap();
        assert_json_include!(
            actual: value,
            expected: json!({
                "title": "Latest News",
                "meta": {"description": "Daily headlines", "keywords": ""},
                "headings": ["Headlines"],
                "paragraphs": ["Updated hourly."],
                "links": [
                    {"href": "/a/1", "text": "First story about things"},
                    {"href": "/a/2", "text": "Second story about things"},
                    {"href": "/a/3", "text": "Third story about things"}
                ],
                "lists": [{"type": "ul", "items": [
                    "First story about things",
                    "Second story about things",
                    "Third story about things"
                ]}],
                "tag_counts": {"a": 3, "div": 1, "img": 2, "li": 3, "section": 1},
                "repeating_blocks": [{"selector": "li.item", "count": 3}]
            })
        );
        assert_eq!(summary.structure_hints.len(), 1);
        assert_eq!(summary.structure_hints[0].id, "news");
        assert_eq!(summary.image_hints.len(), 1);
        assert_eq!(summary.image_hints[0].parent_tag, "section");
    }

    #[test]
    fn test_summary_is_deterministic() {
        let summarizer = DomSummarizer::default();
        assert_eq!(
            summarizer.summarize(LISTING).to_json(),
            summarizer.summarize(LISTING).to_json()
        );
    }

    #[test]
    fn test_limits_are_respected() {
        let links: String = (0..300).map(|i| format!("<a href=\"/p/{i}\">link {i}</a>")).collect();
        let html = format!("<html><body><div>{links}</div></body></html>");
        let summary = DomSummarizer {
            max_links: 25,
            ..DomSummarizer::default()
        }
        .summarize(&html);
        assert_eq!(summary.links.len(), 25);
        assert_eq!(summary.repeating_blocks[0].selector, "div > a");
        assert_eq!(summary.repeating_blocks[0].count, 300);
    }

    #[test]
    fn test_ancestor_chain_skips_html_and_body() {
        let doc = Html::parse_document("<body><main><figure><img src='x.png'></figure></main></body>");
        let img = doc.select(&Selector::parse("img").unwrap()).next().unwrap();
        assert_eq!(ancestor_chain(img), vec!["figure", "main"]);
    }
}
