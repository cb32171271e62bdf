// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page type classification.

use super::ask::Reasoner;
use super::prompts;
use crate::extraction::DomSummary;
use smartspider::{PageTyping, ReasoningError};
use tracing::debug;

pub struct PageClassifier {
    reasoner: Reasoner,
}

impl PageClassifier {
    pub fn new(reasoner: Reasoner) -> Self {
        Self { reasoner }
    }

    pub async fn classify(&self, summary: &DomSummary) -> Result<PageTyping, ReasoningError> {
        let typing: PageTyping = self
            .reasoner
            .ask(&prompts::page_typing(&summary.to_json()))
            .await?;
        debug!(
            page_type = typing.page_type.as_str(),
            confidence = typing.confidence,
            "page classified"
        );
        Ok(typing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::extraction::DomSummarizer;
    use crate::reasoning::mock::MockModelClient;
    use smartspider::PageType;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_classify_with_mock_marker() {
        let reasoner = Reasoner::new(Arc::new(MockModelClient::new()), RetryPolicy::immediate(0));
        let summary = DomSummarizer::default()
            .summarize("<html><head><title>TEST_PAGE_TYPE:gallery</title></head><body></body></html>");
        let typing = PageClassifier::new(reasoner).classify(&summary).await.unwrap();
        assert_eq!(typing.page_type, PageType::Gallery);
        assert_eq!(typing.suggested_fields, vec!["title", "date", "content"]);
    }
}
