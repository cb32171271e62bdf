//! Core data types flowing through the reasoning-to-execution pipeline.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

// ── Fetching ─────────────────────────────────────────────────────────────────

/// Which backend produced a page's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    Static,
    Playwright,
    Selenium,
}

impl RenderMode {
    pub const ALL: [RenderMode; 3] = [RenderMode::Static, RenderMode::Playwright, RenderMode::Selenium];

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Static => "static",
            RenderMode::Playwright => "playwright",
            RenderMode::Selenium => "selenium",
        }
    }

    /// Whether this mode executes the page's JavaScript.
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, RenderMode::Static)
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" | "http" => Ok(RenderMode::Static),
            "playwright" | "chromium" => Ok(RenderMode::Playwright),
            "selenium" | "webdriver" => Ok(RenderMode::Selenium),
            other => Err(format!("unknown render backend: {other}")),
        }
    }
}

/// What happened when one backend was tried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Content passed the dynamic-content heuristic.
    Accepted,
    /// Content was obtained but looks JS-dependent.
    Flagged { signals: Vec<String> },
    /// Transport or driver failure.
    Failed { error: String },
    /// The attempt exceeded its deadline.
    TimedOut { timeout_ms: u64 },
    /// Backend was disabled earlier in this run.
    Skipped,
}

/// A single backend attempt, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendAttempt {
    pub mode: RenderMode,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl BackendAttempt {
    pub fn new(mode: RenderMode, outcome: AttemptOutcome) -> Self {
        Self { mode, outcome }
    }
}

/// A fetched (and possibly rendered) page.
///
/// `final_url` is always absolute and is the URL the content was actually
/// served from, after redirects or client-side navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub final_url: Url,
    pub content: String,
    pub render_mode: RenderMode,
    /// True when the content is still flagged JS-dependent because every
    /// better backend failed.
    pub degraded: bool,
    pub attempts: Vec<BackendAttempt>,
}

impl FetchResult {
    /// Host of the final URL, lowercased. Used as the strategy cache site key.
    pub fn site(&self) -> String {
        self.final_url
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

// ── Page typing ──────────────────────────────────────────────────────────────

/// Closed set of page types the classifier may answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    News,
    List,
    Product,
    Gallery,
    Forum,
    Profile,
    SinglePageApp,
    Unknown,
}

impl PageType {
    pub const ALL: [PageType; 8] = [
        PageType::News,
        PageType::List,
        PageType::Product,
        PageType::Gallery,
        PageType::Forum,
        PageType::Profile,
        PageType::SinglePageApp,
        PageType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::News => "news",
            PageType::List => "list",
            PageType::Product => "product",
            PageType::Gallery => "gallery",
            PageType::Forum => "forum",
            PageType::Profile => "profile",
            PageType::SinglePageApp => "single_page_app",
            PageType::Unknown => "unknown",
        }
    }

    /// Allowed wire labels, in prompt order.
    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| p.as_str()).collect()
    }

    /// Parse a label, applying the aliases models commonly answer with.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let canonical = match normalized.as_str() {
            "detail" | "article" => "news",
            "thread" => "forum",
            "spa" => "single_page_app",
            "listing" => "list",
            other => other,
        };
        Self::ALL.iter().copied().find(|p| p.as_str() == canonical)
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier verdict for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageTyping {
    pub page_type: PageType,
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    #[serde(default)]
    pub suggested_fields: Vec<String>,
}

// ── Intent ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    ExtractInfo,
    CrawlList,
    DownloadImages,
    CrawlDetail,
    ComparePrice,
    Other,
}

impl IntentType {
    pub const ALL: [IntentType; 6] = [
        IntentType::ExtractInfo,
        IntentType::CrawlList,
        IntentType::DownloadImages,
        IntentType::CrawlDetail,
        IntentType::ComparePrice,
        IntentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::ExtractInfo => "extract_info",
            IntentType::CrawlList => "crawl_list",
            IntentType::DownloadImages => "download_images",
            IntentType::CrawlDetail => "crawl_detail",
            IntentType::ComparePrice => "compare_price",
            IntentType::Other => "other",
        }
    }

    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(|i| i.as_str()).collect()
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL.iter().copied().find(|i| i.as_str() == normalized)
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional value type attached to a requested field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Url,
    Date,
}

impl FieldKind {
    pub const ALL: [FieldKind; 4] = [FieldKind::Text, FieldKind::Number, FieldKind::Url, FieldKind::Date];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Url => "url",
            FieldKind::Date => "date",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "text" | "string" => Some(FieldKind::Text),
            "number" | "float" | "int" | "integer" | "price" => Some(FieldKind::Number),
            "url" | "link" | "href" => Some(FieldKind::Url),
            "date" | "datetime" | "time" => Some(FieldKind::Date),
            _ => None,
        }
    }
}

/// One requested field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldKind>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// The user's extraction goal, parsed once per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub intent_type: IntentType,
    /// Ordered, no duplicate names.
    #[serde(rename = "requested_fields")]
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(default)]
    pub raw_text: String,
}

impl Intent {
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Append a field unless one with the same name exists.
    pub fn push_field(&mut self, spec: FieldSpec) -> bool {
        if self.field(&spec.name).is_some() {
            return false;
        }
        self.fields.push(spec);
        true
    }
}

// ── Strategy ─────────────────────────────────────────────────────────────────

/// How a matched element is turned into a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExtractMode {
    /// Trimmed text of the first match.
    Text,
    /// Attribute of the first match.
    Attr(String),
    /// Every match, as a nested list of text or attribute values.
    List { attr: Option<String> },
}

impl ExtractMode {
    /// Parse the method notation used in strategy replies:
    /// `css`, `text`, `attr:<name>`, `list`, `list:attr:<name>`.
    pub fn parse(method: &str) -> Option<Self> {
        let method = method.trim();
        let lowered = method.to_ascii_lowercase();
        match lowered.as_str() {
            "" | "css" | "text" => return Some(ExtractMode::Text),
            "list" | "list:text" | "list:css" => return Some(ExtractMode::List { attr: None }),
            _ => {}
        }
        if let Some(rest) = lowered.strip_prefix("list:attr:") {
            return valid_attr(rest).map(|a| ExtractMode::List { attr: Some(a) });
        }
        if let Some(rest) = lowered.strip_prefix("attr:") {
            return valid_attr(rest).map(ExtractMode::Attr);
        }
        None
    }

    pub fn attr(&self) -> Option<&str> {
        match self {
            ExtractMode::Text => None,
            ExtractMode::Attr(a) => Some(a),
            ExtractMode::List { attr } => attr.as_deref(),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ExtractMode::List { .. })
    }
}

fn valid_attr(name: &str) -> Option<String> {
    let name = name.trim();
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':');
    ok.then(|| name.to_string())
}

impl fmt::Display for ExtractMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractMode::Text => f.write_str("text"),
            ExtractMode::Attr(a) => write!(f, "attr:{a}"),
            ExtractMode::List { attr: None } => f.write_str("list"),
            ExtractMode::List { attr: Some(a) } => write!(f, "list:attr:{a}"),
        }
    }
}

/// Maps one requested field to a DOM selection rule.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub name: String,
    pub selector: String,
    pub mode: ExtractMode,
    /// One value per matched element (list extraction) instead of one per page.
    pub repeating: bool,
    pub limit: Option<usize>,
    pub fallback: Option<String>,
    pub required: bool,
    pub kind: Option<FieldKind>,
}

impl FieldRule {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            mode: ExtractMode::Text,
            repeating: false,
            limit: None,
            fallback: None,
            required: false,
            kind: None,
        }
    }

    pub fn with_mode(mut self, mode: ExtractMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn repeating(mut self) -> Self {
        self.repeating = true;
        self
    }

    pub fn with_fallback(mut self, selector: impl Into<String>) -> Self {
        self.fallback = Some(selector.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A validated extraction plan. Immutable once built; shared through the
/// strategy cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub page_type: PageType,
    pub fields: Vec<FieldRule>,
    pub is_list: bool,
    pub item_link_selector: Option<String>,
    pub pagination_selector: Option<String>,
    pub image_selector: Option<String>,
    pub max_depth: u32,
    pub max_pages: u32,
}

impl Strategy {
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            fields: Vec::new(),
            is_list: false,
            item_link_selector: None,
            pagination_selector: None,
            image_selector: None,
            max_depth: 1,
            max_pages: 1,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn with_field(mut self, rule: FieldRule) -> Self {
        self.fields.retain(|f| f.name != rule.name);
        self.fields.push(rule);
        self
    }

    /// Selectors a page must contain for this strategy to be useful.
    pub fn required_selectors(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.selector.as_str())
            .collect()
    }

    /// Serialize to the same JSON shape the strategy prompt asks the model for.
    pub fn to_reply(&self) -> serde_json::Value {
        use serde_json::{json, Map, Value};

        let mut selectors = Map::new();
        let mut methods = Map::new();
        let mut limits = Map::new();
        let mut types = Map::new();
        let mut fallbacks = Map::new();
        let mut repeating = Vec::new();
        let mut required = Vec::new();

        for rule in &self.fields {
            selectors.insert(rule.name.clone(), Value::String(rule.selector.clone()));
            methods.insert(rule.name.clone(), Value::String(rule.mode.to_string()));
            if let Some(limit) = rule.limit {
                limits.insert(rule.name.clone(), json!(limit));
            }
            if let Some(kind) = rule.kind {
                types.insert(rule.name.clone(), json!(kind.as_str()));
            }
            if let Some(fallback) = &rule.fallback {
                fallbacks.insert(rule.name.clone(), Value::String(fallback.clone()));
            }
            if rule.repeating {
                repeating.push(Value::String(rule.name.clone()));
            }
            if rule.required {
                required.push(Value::String(rule.name.clone()));
            }
        }

        json!({
            "page_type": self.page_type.as_str(),
            "field_selectors": selectors,
            "field_methods": methods,
            "field_limits": limits,
            "field_types": types,
            "repeating_fields": repeating,
            "required_fields": required,
            "is_list": self.is_list,
            "item_link_selector": self.item_link_selector,
            "pagination_selector": self.pagination_selector,
            "max_depth": self.max_depth,
            "max_pages": self.max_pages,
            "image_selector": self.image_selector,
            "fallbacks": { "field_selectors": fallbacks },
        })
    }
}

impl Serialize for Strategy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_reply().serialize(serializer)
    }
}

// ── Records ──────────────────────────────────────────────────────────────────

/// An extracted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    List(Vec<FieldValue>),
    Record(IndexMap<String, FieldValue>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Number(_) => false,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Record(map) => map.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Flat string form: text as-is, numbers formatted, nested values JSON-encoded.
    pub fn to_flat_string(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

/// One extracted record plus provenance.
///
/// Serializes flat: the extracted fields in order, then `source_url` and
/// `page_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    pub fields: IndexMap<String, FieldValue>,
    pub source_url: String,
    pub page_type: PageType,
}

impl Record {
    pub fn new(source_url: impl Into<String>, page_type: PageType) -> Self {
        Self {
            fields: IndexMap::new(),
            source_url: source_url.into(),
            page_type,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(|v| v.as_text())
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields followed by provenance, nested values JSON-encoded.
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_flat_string()))
            .collect();
        out.push(("source_url".to_string(), self.source_url.clone()));
        out.push(("page_type".to_string(), self.page_type.as_str().to_string()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_type_aliases() {
        assert_eq!(PageType::from_label("detail"), Some(PageType::News));
        assert_eq!(PageType::from_label("Thread"), Some(PageType::Forum));
        assert_eq!(PageType::from_label("single-page-app"), Some(PageType::SinglePageApp));
        assert_eq!(PageType::from_label("mixed"), None);
    }

    #[test]
    fn test_extract_mode_notation() {
        assert_eq!(ExtractMode::parse("css"), Some(ExtractMode::Text));
        assert_eq!(ExtractMode::parse("attr:href"), Some(ExtractMode::Attr("href".into())));
        assert_eq!(
            ExtractMode::parse("list:attr:src"),
            Some(ExtractMode::List {
                attr: Some("src".into())
            })
        );
        assert_eq!(ExtractMode::parse("xpath"), None);
        assert_eq!(ExtractMode::parse("attr:"), None);

        for mode in ["text", "attr:data-id", "list", "list:attr:href"] {
            assert_eq!(ExtractMode::parse(mode).unwrap().to_string(), mode);
        }
    }

    #[test]
    fn test_record_flatten_keeps_order_and_provenance() {
        let mut record = Record::new("https://example.com/a", PageType::News);
        record.insert("title", "Hello".into());
        record.insert(
            "tags",
            FieldValue::List(vec!["a".into(), "b".into()]),
        );
        let flat = record.flatten();
        assert_eq!(flat[0], ("title".into(), "Hello".into()));
        assert_eq!(flat[1], ("tags".into(), r#"["a","b"]"#.into()));
        assert_eq!(flat[2].0, "source_url");
        assert_eq!(flat[3], ("page_type".into(), "news".into()));
    }

    #[test]
    fn test_record_serializes_flat() {
        let mut record = Record::new("https://example.com/a", PageType::Product);
        record.insert("name", "Lamp".into());
        record.insert("price", FieldValue::Number(12.5));

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"name":"Lamp","price":12.5,"source_url":"https://example.com/a","page_type":"product"}"#
        );
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_render_mode_parse() {
        assert_eq!("Playwright".parse::<RenderMode>(), Ok(RenderMode::Playwright));
        assert!("lynx".parse::<RenderMode>().is_err());
        assert!(RenderMode::Selenium.is_dynamic());
        assert!(!RenderMode::Static.is_dynamic());
    }
}
