//! Reply schemas: validation of parsed model output into closed types.
//!
//! Validation coerces where the meaning is unambiguous (numeric strings,
//! `"true"`/`"false"`, page type aliases), drops unknown keys, and reports
//! every other deviation as a [`Violation`] so the retry loop can feed the
//! full list back to the model.

use crate::error::Violation;
use crate::types::{
    ExtractMode, FieldKind, FieldRule, FieldSpec, Intent, IntentType, PageType, PageTyping,
    Strategy,
};
use indexmap::IndexMap;
use scraper::Selector;
use serde_json::{Map, Value};

/// A closed type that can be built from an untrusted JSON reply.
pub trait ReplySchema: Sized {
    /// Schema name used in diagnostics.
    const NAME: &'static str;

    /// Validate a parsed reply. Returns every violation found, not just the first.
    fn validate(value: Value) -> Result<Self, Vec<Violation>>;
}

/// Check that a selector parses as CSS.
pub fn check_selector(selector: &str) -> Result<(), String> {
    if selector.trim().is_empty() {
        return Err("selector is empty".to_string());
    }
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| format!("invalid CSS selector: {e:?}"))
}

// ── Object reader ────────────────────────────────────────────────────────────

/// Field-by-field reader over a JSON object that accumulates violations.
struct ObjectReader {
    map: Map<String, Value>,
    violations: Vec<Violation>,
}

impl ObjectReader {
    fn new(value: Value) -> Result<Self, Vec<Violation>> {
        match value {
            Value::Object(map) => Ok(Self {
                map,
                violations: Vec::new(),
            }),
            other => Err(vec![Violation::new(
                "$",
                format!("expected a JSON object, got {}", type_name(&other)),
            )]),
        }
    }

    fn violation(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation::new(path, message));
    }

    /// Present and not null.
    fn take(&mut self, key: &str) -> Option<Value> {
        match self.map.remove(key) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        }
    }

    fn required(&mut self, key: &str) -> Option<Value> {
        let value = self.take(key);
        if value.is_none() {
            self.violation(key, "required field missing");
        }
        value
    }

    fn optional_str(&mut self, key: &str) -> Option<String> {
        match self.take(key)? {
            Value::String(s) => {
                let s = s.trim().to_string();
                (!s.is_empty()).then_some(s)
            }
            other => {
                self.violation(key, format!("expected a string, got {}", type_name(&other)));
                None
            }
        }
    }

    fn enum_value<T>(
        &mut self,
        key: &str,
        value: Value,
        parse: impl Fn(&str) -> Option<T>,
        allowed: &[&str],
    ) -> Option<T> {
        match &value {
            Value::String(s) => {
                let parsed = parse(s);
                if parsed.is_none() {
                    self.violation(
                        key,
                        format!("`{s}` is not one of: {}", allowed.join(", ")),
                    );
                }
                parsed
            }
            other => {
                self.violation(key, format!("expected a string, got {}", type_name(other)));
                None
            }
        }
    }

    fn number(&mut self, key: &str, value: Value) -> Option<f64> {
        let n = coerce_number(&value);
        if n.is_none() {
            self.violation(key, format!("expected a number, got {}", describe(&value)));
        }
        n
    }

    fn optional_count(&mut self, key: &str) -> Option<u32> {
        let value = self.take(key)?;
        match coerce_number(&value) {
            Some(n) if n >= 1.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => Some(n as u32),
            _ => {
                self.violation(
                    key,
                    format!("expected a positive integer, got {}", describe(&value)),
                );
                None
            }
        }
    }

    fn optional_bool(&mut self, key: &str) -> Option<bool> {
        let value = self.take(key)?;
        let b = match &value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            _ => None,
        };
        if b.is_none() {
            self.violation(key, format!("expected a boolean, got {}", describe(&value)));
        }
        b
    }

    fn string_list(&mut self, key: &str) -> Vec<String> {
        let Some(value) = self.take(key) else {
            return Vec::new();
        };
        let items = match value {
            Value::Array(items) => items,
            // A lone string is read as a one-element list.
            Value::String(s) => vec![Value::String(s)],
            other => {
                self.violation(key, format!("expected a list, got {}", type_name(&other)));
                return Vec::new();
            }
        };
        let mut out: Vec<String> = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            match item {
                Value::String(s) => {
                    let s = s.trim().to_string();
                    if !s.is_empty() && !out.contains(&s) {
                        out.push(s);
                    }
                }
                other => self.violation(
                    format!("{key}[{i}]"),
                    format!("expected a string, got {}", type_name(&other)),
                ),
            }
        }
        out
    }

    /// An object of string values, in document order.
    fn string_map(&mut self, key: &str, value: Value) -> IndexMap<String, String> {
        let mut out = IndexMap::new();
        let map = match value {
            Value::Object(map) => map,
            other => {
                self.violation(key, format!("expected an object, got {}", type_name(&other)));
                return out;
            }
        };
        for (name, v) in map {
            let name = name.trim().to_string();
            match v {
                Value::String(s) => {
                    out.insert(name, s.trim().to_string());
                }
                Value::Null => {}
                other => self.violation(
                    format!("{key}.{name}"),
                    format!("expected a string, got {}", type_name(&other)),
                ),
            }
        }
        out
    }

    fn finish<T>(self, value: Option<T>) -> Result<T, Vec<Violation>> {
        match value {
            Some(v) if self.violations.is_empty() => Ok(v),
            _ => Err(self.violations),
        }
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok().map(|n| {
            if s.trim().ends_with('%') {
                n / 100.0
            } else {
                n
            }
        }),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("`{s}`"),
        other => type_name(other).to_string(),
    }
}

// ── PageTyping ───────────────────────────────────────────────────────────────

impl ReplySchema for PageTyping {
    const NAME: &'static str = "page_typing";

    fn validate(value: Value) -> Result<Self, Vec<Violation>> {
        let mut r = ObjectReader::new(value)?;

        let page_type = r
            .required("page_type")
            .and_then(|v| r.enum_value("page_type", v, PageType::from_label, &PageType::labels()));
        let confidence = r
            .required("confidence")
            .and_then(|v| r.number("confidence", v))
            .map(|c| c.clamp(0.0, 1.0));
        let justification = r.optional_str("justification");
        let suggested_fields = r.string_list("suggested_fields");

        let typing = match (page_type, confidence) {
            (Some(page_type), Some(confidence)) => Some(PageTyping {
                page_type,
                confidence,
                justification,
                suggested_fields,
            }),
            _ => None,
        };
        r.finish(typing)
    }
}

// ── Intent ───────────────────────────────────────────────────────────────────

impl ReplySchema for Intent {
    const NAME: &'static str = "intent";

    fn validate(value: Value) -> Result<Self, Vec<Violation>> {
        let mut r = ObjectReader::new(value)?;

        let intent_type = r.required("intent_type").and_then(|v| {
            r.enum_value("intent_type", v, IntentType::from_label, &IntentType::labels())
        });

        let mut fields: Vec<FieldSpec> = Vec::new();
        match r.required("requested_fields") {
            Some(Value::Array(items)) => {
                for (i, item) in items.into_iter().enumerate() {
                    let path = format!("requested_fields[{i}]");
                    let spec = match item {
                        Value::String(name) => Some(FieldSpec::new(name.trim())),
                        Value::Object(mut obj) => {
                            let name = match obj.remove("name") {
                                Some(Value::String(n)) => Some(n.trim().to_string()),
                                _ => {
                                    r.violation(&path, "field object needs a string `name`");
                                    None
                                }
                            };
                            let kind = match obj.remove("type") {
                                Some(Value::String(t)) => {
                                    let kind = FieldKind::from_label(&t);
                                    if kind.is_none() {
                                        r.violation(
                                            format!("{path}.type"),
                                            format!("`{t}` is not one of: text, number, url, date"),
                                        );
                                    }
                                    kind
                                }
                                Some(Value::Null) | None => None,
                                Some(other) => {
                                    r.violation(
                                        format!("{path}.type"),
                                        format!("expected a string, got {}", type_name(&other)),
                                    );
                                    None
                                }
                            };
                            name.map(|n| FieldSpec { name: n, kind })
                        }
                        other => {
                            r.violation(
                                &path,
                                format!("expected a string or object, got {}", type_name(&other)),
                            );
                            None
                        }
                    };
                    if let Some(spec) = spec.filter(|s| !s.name.is_empty()) {
                        if !fields.iter().any(|f| f.name == spec.name) {
                            fields.push(spec);
                        }
                    }
                }
            }
            Some(other) => r.violation(
                "requested_fields",
                format!("expected a list, got {}", type_name(&other)),
            ),
            None => {}
        }

        let scope = r.optional_str("scope");
        let max_items = r.optional_count("max_items").map(|n| n as usize);
        let raw_text = r.optional_str("raw_text").unwrap_or_default();

        let intent = intent_type.map(|intent_type| Intent {
            intent_type,
            fields,
            scope,
            max_items,
            raw_text,
        });
        r.finish(intent)
    }
}

// ── Strategy ─────────────────────────────────────────────────────────────────

impl ReplySchema for Strategy {
    const NAME: &'static str = "strategy";

    fn validate(value: Value) -> Result<Self, Vec<Violation>> {
        let mut r = ObjectReader::new(value)?;

        let page_type = match r.take("page_type") {
            Some(v) => r.enum_value("page_type", v, PageType::from_label, &PageType::labels()),
            None => Some(PageType::Unknown),
        };

        let selectors = match r.required("field_selectors") {
            Some(v) => Some(r.string_map("field_selectors", v)),
            None => None,
        };
        let methods = match r.take("field_methods") {
            Some(v) => r.string_map("field_methods", v),
            None => IndexMap::new(),
        };
        let types = match r.take("field_types") {
            Some(v) => r.string_map("field_types", v),
            None => IndexMap::new(),
        };
        let limits = read_limits(&mut r);
        let fallbacks = read_fallbacks(&mut r);
        let is_list = r.optional_bool("is_list").unwrap_or(false);
        let repeating_declared = r.map.contains_key("repeating_fields");
        let repeating = r.string_list("repeating_fields");
        let required = r.string_list("required_fields");

        let item_link_selector = r.optional_str("item_link_selector");
        let pagination_selector = r.optional_str("pagination_selector");
        let image_selector = r.optional_str("image_selector");
        for (key, selector) in [
            ("item_link_selector", &item_link_selector),
            ("pagination_selector", &pagination_selector),
            ("image_selector", &image_selector),
        ] {
            if let Some(Err(e)) = selector.as_deref().map(check_selector) {
                r.violation(key, e);
            }
        }
        let max_depth = r.optional_count("max_depth").unwrap_or(1);
        let max_pages = r.optional_count("max_pages").unwrap_or(1);

        let mut rules = Vec::new();
        for (name, selector) in selectors.iter().flatten() {
            if name.is_empty() {
                r.violation("field_selectors", "field name is empty");
                continue;
            }
            let path = format!("field_selectors.{name}");
            if let Err(e) = check_selector(selector) {
                r.violation(path, e);
                continue;
            }

            let mode = match methods.get(name) {
                Some(method) => match ExtractMode::parse(method) {
                    Some(mode) => mode,
                    None => {
                        r.violation(
                            format!("field_methods.{name}"),
                            format!(
                                "`{method}` is not one of: text, attr:<name>, list, list:attr:<name>"
                            ),
                        );
                        continue;
                    }
                },
                None => ExtractMode::Text,
            };

            let kind = match types.get(name) {
                Some(t) => match FieldKind::from_label(t) {
                    Some(kind) => Some(kind),
                    None => {
                        r.violation(
                            format!("field_types.{name}"),
                            format!("`{t}` is not one of: text, number, url, date"),
                        );
                        None
                    }
                },
                None => None,
            };

            let fallback = fallbacks.get(name).cloned().filter(|f| !f.is_empty());
            if let Some(Err(e)) = fallback.as_deref().map(check_selector) {
                r.violation(format!("fallbacks.field_selectors.{name}"), e);
            }

            let is_repeating = if repeating_declared {
                repeating.iter().any(|f| f == name)
            } else {
                is_list && !mode.is_list()
            };

            rules.push(FieldRule {
                name: name.clone(),
                selector: selector.clone(),
                mode,
                repeating: is_repeating,
                limit: limits.get(name).copied(),
                fallback,
                required: required.iter().any(|f| f == name),
                kind,
            });
        }

        let strategy = match (page_type, selectors) {
            (Some(page_type), Some(_)) => Some(Strategy {
                page_type,
                fields: rules,
                is_list,
                item_link_selector,
                pagination_selector,
                image_selector,
                max_depth,
                max_pages,
            }),
            _ => None,
        };
        r.finish(strategy)
    }
}

fn read_limits(r: &mut ObjectReader) -> IndexMap<String, usize> {
    let mut out = IndexMap::new();
    let Some(value) = r.take("field_limits") else {
        return out;
    };
    let map = match value {
        Value::Object(map) => map,
        other => {
            r.violation(
                "field_limits",
                format!("expected an object, got {}", type_name(&other)),
            );
            return out;
        }
    };
    for (name, v) in map {
        if v.is_null() {
            continue;
        }
        match coerce_number(&v) {
            Some(n) if n >= 1.0 && n.fract() == 0.0 => {
                out.insert(name, n as usize);
            }
            _ => r.violation(
                format!("field_limits.{name}"),
                format!("expected a positive integer, got {}", describe(&v)),
            ),
        }
    }
    out
}

/// Accepts `{"field_selectors": {...}}` and the flat `{field: selector}` form.
fn read_fallbacks(r: &mut ObjectReader) -> IndexMap<String, String> {
    let Some(value) = r.take("fallbacks") else {
        return IndexMap::new();
    };
    match value {
        Value::Object(mut map) => match map.remove("field_selectors") {
            Some(nested) => r.string_map("fallbacks.field_selectors", nested),
            None => r.string_map("fallbacks", Value::Object(map)),
        },
        other => {
            r.violation(
                "fallbacks",
                format!("expected an object, got {}", type_name(&other)),
            );
            IndexMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(violations: &[Violation]) -> Vec<&str> {
        violations.iter().map(|v| v.path.as_str()).collect()
    }

    #[test]
    fn test_page_typing_coerces_confidence_and_drops_unknown_keys() {
        let typing = PageTyping::validate(json!({
            "page_type": "Article",
            "confidence": "0.85",
            "mood": "cheerful",
            "suggested_fields": ["title", "date", "title"]
        }))
        .unwrap();
        assert_eq!(typing.page_type, PageType::News);
        assert!((typing.confidence - 0.85).abs() < 1e-9);
        assert_eq!(typing.suggested_fields, vec!["title", "date"]);

        let clamped = PageTyping::validate(json!({"page_type": "list", "confidence": 3})).unwrap();
        assert_eq!(clamped.confidence, 1.0);
    }

    #[test]
    fn test_page_typing_reports_all_violations() {
        let err = PageTyping::validate(json!({"page_type": "carousel"})).unwrap_err();
        assert_eq!(paths(&err), vec!["page_type", "confidence"]);
        assert!(err[0].message.contains("single_page_app"));

        let err = PageTyping::validate(json!(["news"])).unwrap_err();
        assert_eq!(paths(&err), vec!["$"]);
    }

    #[test]
    fn test_intent_accepts_string_and_object_fields() {
        let intent = Intent::validate(json!({
            "intent_type": "crawl_list",
            "requested_fields": ["title", {"name": "price", "type": "number"}, "title"],
            "max_items": "10"
        }))
        .unwrap();
        assert_eq!(intent.intent_type, IntentType::CrawlList);
        assert_eq!(intent.field_names(), vec!["title", "price"]);
        assert_eq!(intent.fields[1].kind, Some(FieldKind::Number));
        assert_eq!(intent.max_items, Some(10));
    }

    #[test]
    fn test_intent_rejects_bad_enum_and_field_type() {
        let err = Intent::validate(json!({
            "intent_type": "scrape_everything",
            "requested_fields": [{"name": "x", "type": "blob"}]
        }))
        .unwrap_err();
        assert_eq!(paths(&err), vec!["intent_type", "requested_fields[0].type"]);
    }

    #[test]
    fn test_strategy_validates_selectors_and_methods() {
        let err = Strategy::validate(json!({
            "field_selectors": {"title": "h1", "price": "div[[", "link": "a"},
            "field_methods": {"link": "xpath"},
            "pagination_selector": "a..next"
        }))
        .unwrap_err();
        assert_eq!(
            paths(&err),
            vec!["pagination_selector", "field_selectors.price", "field_methods.link"]
        );
    }

    #[test]
    fn test_strategy_defaults_repeating_from_is_list() {
        let strategy = Strategy::validate(json!({
            "page_type": "list",
            "field_selectors": {"title": ".item h2", "tags": ".tag"},
            "field_methods": {"tags": "list"},
            "is_list": "true",
            "fallbacks": {"title": "title"}
        }))
        .unwrap();
        assert!(strategy.is_list);
        assert!(strategy.field("title").unwrap().repeating);
        assert!(!strategy.field("tags").unwrap().repeating);
        assert_eq!(strategy.field("title").unwrap().fallback.as_deref(), Some("title"));
        assert_eq!(strategy.max_pages, 1);
    }

    #[test]
    fn test_validate_is_idempotent_on_valid_strategy() {
        let strategy = Strategy::new(PageType::List)
            .with_field(
                FieldRule::new("title", ".card h2")
                    .repeating()
                    .required()
                    .with_fallback("meta[property='og:title']"),
            )
            .with_field(
                FieldRule::new("link", ".card a")
                    .with_mode(ExtractMode::Attr("href".into()))
                    .repeating()
                    .with_kind(FieldKind::Url),
            )
            .with_field(
                FieldRule::new("tags", ".tags li")
                    .with_mode(ExtractMode::List { attr: None })
                    .with_limit(5),
            );
        let strategy = Strategy {
            is_list: true,
            pagination_selector: Some("a[rel='next']".into()),
            max_pages: 3,
            max_depth: 2,
            ..strategy
        };

        let once = Strategy::validate(strategy.to_reply()).unwrap();
        assert_eq!(once, strategy);
        let twice = Strategy::validate(once.to_reply()).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn test_validate_is_idempotent_on_valid_typing_and_intent() {
        let typing = PageTyping {
            page_type: PageType::Product,
            confidence: 0.5,
            justification: Some("price block".into()),
            suggested_fields: vec!["price".into()],
        };
        let value = serde_json::to_value(&typing).unwrap();
        assert_eq!(PageTyping::validate(value).unwrap(), typing);

        let intent = Intent {
            intent_type: IntentType::ExtractInfo,
            fields: vec![FieldSpec::new("title"), FieldSpec::new("date").with_kind(FieldKind::Date)],
            scope: Some("first page only".into()),
            max_items: Some(3),
            raw_text: "get title and date".into(),
        };
        let value = serde_json::to_value(&intent).unwrap();
        assert_eq!(Intent::validate(value).unwrap(), intent);
    }
}
