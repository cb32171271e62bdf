// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Prompt templates. Every template demands a single bare JSON object and
//! enumerates the allowed values of each closed field.

use smartspider::{FieldKind, Intent, IntentType, PageType, PageTyping, Violation};

/// Longest slice of a rejected reply echoed back in a correction prompt.
const MAX_ECHOED_REPLY_CHARS: usize = 2000;

fn quoted(labels: &[&str]) -> String {
    labels
        .iter()
        .map(|l| format!("\"{l}\""))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn page_typing(dom_summary: &str) -> String {
    format!(
        r#"You are a web page structure classifier. Decide the page type from the DOM summary.

Hard requirements:
1. page_type must be one of (lowercase): [{types}]
2. Output EXACTLY one JSON object. No prose, comments or Markdown code fences.
3. The object must contain page_type, confidence (float between 0 and 1),
   justification (one short sentence) and suggested_fields (array of strings).

Output format:
{{"page_type": "news", "confidence": 0.92, "justification": "single article with byline", "suggested_fields": ["title", "date", "content"]}}

DOM summary:
{dom_summary}
"#,
        types = quoted(&PageType::labels()),
    )
}

pub fn intent(task: &str) -> String {
    format!(
        r#"You are a natural language task interpreter. Select intent_type strictly from:
[{types}]

List the fields the user explicitly asks for, in the order they are mentioned. A field is
either a name or an object {{"name": ..., "type": ...}} with type one of [{kinds}].
Set max_items when the user limits the number of items, and scope when they restrict
which part of the site to read.

Return ONLY a JSON object with the keys intent_type, requested_fields, max_items, scope.

Example:
{{"intent_type": "crawl_list", "requested_fields": ["title", {{"name": "price", "type": "number"}}], "max_items": 10, "scope": null}}

User instruction:
{task}
"#,
        types = quoted(&IntentType::labels()),
        kinds = quoted(&FieldKind::ALL.map(|k| k.as_str())),
    )
}

pub fn strategy(typing: &PageTyping, intent: &Intent, dom_summary: &str) -> String {
    let requested = serde_json::to_string(&intent.field_names()).unwrap_or_else(|_| "[]".into());
    format!(
        r#"You are a strategy generator. Return a deterministic JSON object describing how to
extract data from the page with CSS selectors.

Context:
- page_type: {page_type}
- intent_type: {intent_type}
- user requested fields: {requested}
- DOM summary: {dom_summary}

Constraints:
1. Respond with a SINGLE JSON object. No prose or Markdown.
2. Allowed keys: field_selectors (object of field -> CSS selector, required),
   field_methods (object of field -> "text" | "attr:<name>" | "list" | "list:attr:<name>"),
   field_limits (object of field -> integer), field_types (object of field -> [{kinds}]),
   repeating_fields (array), required_fields (array), is_list (bool),
   item_link_selector (string|null), pagination_selector (string|null), image_selector (string|null),
   max_depth (int), max_pages (int), fallbacks (object with field_selectors).
3. Every selector must be valid CSS. Prefer selectors derived from structure_hints and
   repeating_blocks; avoid bare "body" or "div".
4. Link fields must use attr:href, image fields must use attr:src.
5. On list pages mark the per-item fields in repeating_fields.

Example output:
{{"field_selectors": {{"title": "article h1", "content": ".article-body"}}, "field_methods": {{"title": "text", "content": "text"}}, "field_limits": {{}}, "is_list": false, "item_link_selector": null, "pagination_selector": null, "max_depth": 1, "max_pages": 1, "image_selector": null, "fallbacks": {{"field_selectors": {{"title": "title"}}}}}}
"#,
        page_type = typing.page_type.as_str(),
        intent_type = intent.intent_type.as_str(),
        kinds = quoted(&FieldKind::ALL.map(|k| k.as_str())),
    )
}

/// Append the diagnostics of a rejected reply so the model can correct itself.
pub fn with_correction(prompt: &str, violations: &[Violation], rejected: &str) -> String {
    let mut out = String::with_capacity(prompt.len() + 512);
    out.push_str(prompt);
    out.push_str("\n\nYour previous reply was rejected:\n");
    for v in violations {
        out.push_str("- ");
        out.push_str(&v.to_string());
        out.push('\n');
    }
    out.push_str("\nPrevious reply:\n");
    out.extend(rejected.chars().take(MAX_ECHOED_REPLY_CHARS));
    out.push_str("\n\nReturn a corrected JSON object only.\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_enumerate_allowed_values() {
        let p = page_typing("{}");
        assert!(p.contains("\"single_page_app\""));
        assert!(!p.contains("field_selectors"));

        let p = intent("get titles");
        assert!(p.contains("\"compare_price\""));
        assert!(p.contains("\"number\""));
        assert!(p.ends_with("get titles\n"));
    }

    #[test]
    fn test_correction_lists_violations() {
        let p = with_correction(
            "BASE",
            &[Violation::new("page_type", "required field missing")],
            &"x".repeat(5000),
        );
        assert!(p.starts_with("BASE"));
        assert!(p.contains("- page_type: required field missing"));
        assert!(p.matches('x').count() == MAX_ECHOED_REPLY_CHARS);
    }
}
