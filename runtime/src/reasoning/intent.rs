// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Task text to [`Intent`].
//!
//! The model's validated reply is authoritative; keyword tables only add
//! fields the model missed and the item limit stated in the text.

use super::ask::Reasoner;
use super::prompts;
use regex::Regex;
use smartspider::{FieldKind, FieldSpec, Intent, IntentType, ReasoningError};
use std::sync::LazyLock;
use tracing::debug;

/// Field name, then the keywords (English and Chinese) that request it.
const FIELD_HINTS: &[(&str, &[&str])] = &[
    ("title", &["标题", "题目", "title", "headline"]),
    ("content", &["正文", "内容", "详情", "content", "description", "body"]),
    ("date", &["时间", "日期", "time", "date"]),
    ("author", &["作者", "发布人", "回答者", "author"]),
    ("price", &["价格", "价钱", "price"]),
    ("images", &["图片", "配图", "image", "photo"]),
    ("links", &["链接", "url", "跳转", "link"]),
    ("name", &["用户名", "昵称", "name"]),
    ("follows", &["粉丝", "关注", "followers"]),
    ("answer", &["回答", "回复", "answer"]),
    ("sub_comments", &["楼中楼", "回复", "评论", "comments"]),
];

const INTENT_HINTS: &[(IntentType, &[&str])] = &[
    (IntentType::CrawlList, &["列表", "多条", "分页", "批量", "前", "top", "list", "every"]),
    (IntentType::DownloadImages, &["下载图片", "保存图片", "图集", "download images", "save images"]),
    (IntentType::CrawlDetail, &["详情页", "递归", "深度", "detail page", "follow links"]),
    (IntentType::ComparePrice, &["比价", "compare price", "cheapest"]),
];

static LIMIT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:前|top|first)\s*(\d+)").expect("limit prefix regex is valid")
});
static LIMIT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:个|条|篇|章|项|items?\b|links?\b|results?\b|articles?\b|posts?\b)")
        .expect("limit suffix regex is valid")
});

/// Item limit stated in the task text, if any.
pub fn parse_limit(task: &str) -> Option<usize> {
    [&*LIMIT_PREFIX, &*LIMIT_SUFFIX].into_iter().find_map(|re| {
        re.captures(task)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .filter(|n| *n > 0)
    })
}

/// Fields whose keywords occur in the task, in table order.
pub fn keyword_fields(task: &str) -> Vec<&'static str> {
    let lowered = task.to_lowercase();
    FIELD_HINTS
        .iter()
        .filter(|(_, hints)| hints.iter().any(|h| lowered.contains(h)))
        .map(|(field, _)| *field)
        .collect()
}

/// Intent type suggested by keywords alone.
pub fn keyword_intent_type(task: &str) -> IntentType {
    let lowered = task.to_lowercase();
    INTENT_HINTS
        .iter()
        .find(|(_, hints)| hints.iter().any(|h| lowered.contains(h)))
        .map(|(intent, _)| *intent)
        .unwrap_or(IntentType::ExtractInfo)
}

/// Kind implied by a well-known field name.
pub fn default_kind(field: &str) -> Option<FieldKind> {
    match field {
        "price" | "follows" => Some(FieldKind::Number),
        "date" => Some(FieldKind::Date),
        "links" | "images" => Some(FieldKind::Url),
        _ => None,
    }
}

pub struct IntentParser {
    reasoner: Reasoner,
}

impl IntentParser {
    pub fn new(reasoner: Reasoner) -> Self {
        Self { reasoner }
    }

    pub async fn parse(&self, task: &str) -> Result<Intent, ReasoningError> {
        let intent: Intent = self.reasoner.ask(&prompts::intent(task)).await?;
        let intent = enrich(intent, task);
        debug!(
            intent_type = intent.intent_type.as_str(),
            fields = ?intent.field_names(),
            max_items = ?intent.max_items,
            "intent parsed"
        );
        Ok(intent)
    }
}

/// Merge keyword fields after the model's, fill default kinds, read the
/// item limit from the text, and consult keywords only when the model
/// answered `other`.
pub fn enrich(mut intent: Intent, task: &str) -> Intent {
    intent.raw_text = task.to_string();
    for field in keyword_fields(task) {
        intent.push_field(FieldSpec::new(field));
    }
    for spec in &mut intent.fields {
        if spec.kind.is_none() {
            spec.kind = default_kind(&spec.name);
        }
    }
    if let Some(limit) = parse_limit(task) {
        intent.max_items = Some(limit);
    }
    if intent.intent_type == IntentType::Other {
        intent.intent_type = keyword_intent_type(task);
    }
    intent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::reasoning::mock::ScriptedModelClient;
    use std::sync::Arc;

    #[test]
    fn test_parse_limit_variants() {
        assert_eq!(parse_limit("抓取前10条新闻"), Some(10));
        assert_eq!(parse_limit("Top 5 stories"), Some(5));
        assert_eq!(parse_limit("get 20 items with price"), Some(20));
        assert_eq!(parse_limit("collect 3 links"), Some(3));
        assert_eq!(parse_limit("titles from 2024"), None);
        assert_eq!(parse_limit("前0条"), None);
    }

    #[test]
    fn test_keyword_fields_in_table_order() {
        assert_eq!(keyword_fields("提取标题和发布时间以及作者"), vec!["title", "date", "author"]);
        assert_eq!(keyword_fields("Price and TITLE"), vec!["title", "price"]);
    }

    #[test]
    fn test_enrich_appends_after_model_fields() {
        let intent = Intent {
            intent_type: IntentType::Other,
            fields: vec![FieldSpec::new("price").with_kind(FieldKind::Text), FieldSpec::new("title")],
            scope: None,
            max_items: Some(50),
            raw_text: String::new(),
        };
        let intent = enrich(intent, "列表页前10个商品的标题、价格和图片");
        assert_eq!(intent.field_names(), vec!["price", "title", "images"]);
        // Model-provided kinds win over name defaults.
        assert_eq!(intent.fields[0].kind, Some(FieldKind::Text));
        assert_eq!(intent.fields[2].kind, Some(FieldKind::Url));
        assert_eq!(intent.max_items, Some(10));
        assert_eq!(intent.intent_type, IntentType::CrawlList);
        assert_eq!(intent.raw_text, "列表页前10个商品的标题、价格和图片");
    }

    #[tokio::test]
    async fn test_model_intent_type_is_authoritative() {
        let client = Arc::new(ScriptedModelClient::new([
            r#"{"intent_type": "download_images", "requested_fields": ["images"]}"#,
        ]));
        let parser = IntentParser::new(Reasoner::new(client, RetryPolicy::immediate(0)));
        let intent = parser.parse("list every title").await.unwrap();
        assert_eq!(intent.intent_type, IntentType::DownloadImages);
        assert_eq!(intent.field_names(), vec!["images", "title"]);
        assert_eq!(intent.max_items, None);
    }
}
