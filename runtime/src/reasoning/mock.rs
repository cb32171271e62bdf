// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Offline model clients: a deterministic mock for `--provider mock` and a
//! scripted client for tests.

use super::client::ModelClient;
use async_trait::async_trait;
use serde_json::json;
use smartspider::ModelError;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Which template a prompt was rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    PageTyping,
    Intent,
    Strategy,
    Unknown,
}

/// Classify a prompt by the JSON keys it asks for. The strategy prompt also
/// mentions `page_type` and `intent_type`, so it is checked first.
pub fn detect_kind(prompt: &str) -> PromptKind {
    if prompt.contains("field_selectors") {
        PromptKind::Strategy
    } else if prompt.contains("intent_type") {
        PromptKind::Intent
    } else if prompt.contains("page_type") {
        PromptKind::PageTyping
    } else {
        PromptKind::Unknown
    }
}

const PAGE_TYPE_MARKER: &str = "test_page_type:";

/// Deterministic replies by prompt kind.
///
/// Page typing answers `news` unless the prompt carries a
/// `TEST_PAGE_TYPE:<type>` marker (usually planted in the page's markup).
#[derive(Debug, Default, Clone)]
pub struct MockModelClient;

impl MockModelClient {
    pub fn new() -> Self {
        Self
    }

    fn page_type(prompt: &str) -> String {
        let lowered = prompt.to_lowercase();
        lowered
            .find(PAGE_TYPE_MARKER)
            .and_then(|idx| lowered[idx + PAGE_TYPE_MARKER.len()..].split_whitespace().next())
            .map(|v| {
                v.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                    .to_string()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "news".to_string())
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let payload = match detect_kind(prompt) {
            PromptKind::PageTyping => json!({
                "page_type": Self::page_type(prompt),
                "confidence": 0.99,
                "justification": "mock classification",
                "suggested_fields": ["title", "date", "content"]
            }),
            PromptKind::Intent => json!({
                "intent_type": "extract_info",
                "requested_fields": ["title", "content"]
            }),
            PromptKind::Strategy => json!({
                "field_selectors": {"title": "h1", "date": "time", "content": "p"},
                "field_methods": {"title": "text", "date": "text", "content": "text"},
                "is_list": false,
                "item_link_selector": null,
                "pagination_selector": null,
                "max_depth": 1,
                "max_pages": 1,
                "image_selector": null,
                "fallbacks": {}
            }),
            PromptKind::Unknown => json!({"message": "mock response"}),
        };
        Ok(payload.to_string())
    }
}

/// Replays a fixed queue of replies and records every prompt it receives.
/// An exhausted script answers with a network error.
#[derive(Debug, Default)]
pub struct ScriptedModelClient {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModelClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a failure.
    pub fn push_error(&self, error: ModelError) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(reply.into()));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Network("scripted replies exhausted".into())))
    }
}
