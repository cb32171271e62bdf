// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! The uniform "ask model, parse, heal, validate, retry" loop.
//!
//! State carried between attempts is explicit: the attempt counter and the
//! diagnostics of the last rejected reply, which are appended to the next
//! prompt so the model can correct itself.

use super::client::ModelClient;
use super::prompts;
use crate::config::RetryPolicy;
use smartspider::{
    describe_violations, parse_reply, ReasoningError, ReplySchema,
    SchemaValidationError, Violation,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Schema-validating front end of a [`ModelClient`].
#[derive(Clone)]
pub struct Reasoner {
    client: Arc<dyn ModelClient>,
    retry: RetryPolicy,
}

impl Reasoner {
    pub fn new(client: Arc<dyn ModelClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Ask for a `T`. Fails with the last raw reply and its violations once
    /// the retry budget is spent, or when the overall deadline passes.
    pub async fn ask<T: ReplySchema>(&self, prompt: &str) -> Result<T, ReasoningError> {
        self.ask_with(prompt, |value| value).await
    }

    /// Like [`ask`](Self::ask), with `prepare` applied to every parsed reply
    /// before validation (used to lay defaults underneath the model's answer).
    pub async fn ask_with<T, F>(&self, prompt: &str, prepare: F) -> Result<T, ReasoningError>
    where
        T: ReplySchema,
        F: Fn(Value) -> Value + Send + Sync,
    {
        match tokio::time::timeout(self.retry.deadline, self.attempts::<T, F>(prompt, &prepare)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(schema = T::NAME, deadline = ?self.retry.deadline, "reasoning deadline exceeded");
                Err(ReasoningError::DeadlineExceeded(self.retry.deadline))
            }
        }
    }

    async fn attempts<T, F>(&self, prompt: &str, prepare: &F) -> Result<T, ReasoningError>
    where
        T: ReplySchema,
        F: Fn(Value) -> Value + Send + Sync,
    {
        let mut current = prompt.to_string();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let raw = match self.client.complete(&current).await {
                Ok(raw) => raw,
                Err(e) if e.is_transient() && attempt <= self.retry.max_retries => {
                    warn!(schema = T::NAME, attempt, error = %e, "model call failed, retrying");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let violations = match check::<T, F>(&raw, prepare) {
                Ok(value) => {
                    debug!(schema = T::NAME, attempt, "model reply accepted");
                    return Ok(value);
                }
                Err(violations) => violations,
            };

            if attempt > self.retry.max_retries {
                return Err(SchemaValidationError {
                    schema: T::NAME,
                    raw_response: raw,
                    violations,
                    attempts: attempt,
                }
                .into());
            }

            warn!(
                schema = T::NAME,
                attempt,
                diagnostics = %describe_violations(&violations),
                "model reply failed validation, asking for a correction"
            );
            tokio::time::sleep(self.retry.delay_for(attempt)).await;
            current = prompts::with_correction(prompt, &violations, &raw);
        }
    }
}

/// Parse (healing once if needed) and validate one raw reply.
fn check<T, F>(raw: &str, prepare: &F) -> Result<T, Vec<Violation>>
where
    T: ReplySchema,
    F: Fn(Value) -> Value,
{
    let parsed = parse_reply(raw).map_err(|v| vec![v])?;
    if parsed.healed {
        debug!(schema = T::NAME, "reply parsed after auto-heal");
    }
    T::validate(prepare(parsed.value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::mock::ScriptedModelClient;
    use smartspider::{ModelError, PageType, PageTyping};
    use std::time::Duration;

    fn reasoner(client: &Arc<ScriptedModelClient>) -> Reasoner {
        Reasoner::new(client.clone(), RetryPolicy::immediate(2))
    }

    #[tokio::test]
    async fn test_fenced_reply_is_healed_without_retry() {
        let client = Arc::new(ScriptedModelClient::new([
            "Sure! ```json\n{\"page_type\": \"list\", \"confidence\": 0.8,}\n```",
        ]));
        let typing: PageTyping = reasoner(&client).ask("classify").await.unwrap();
        assert_eq!(typing.page_type, PageType::List);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_reply_triggers_self_correction() {
        let client = Arc::new(ScriptedModelClient::new([
            r#"{"page_type": "carousel", "confidence": 0.5}"#,
            r#"{"page_type": "gallery", "confidence": 0.5}"#,
        ]));
        let typing: PageTyping = reasoner(&client).ask("classify").await.unwrap();
        assert_eq!(typing.page_type, PageType::Gallery);

        let prompts = client.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].starts_with("classify"));
        assert!(prompts[1].contains("page_type:"));
        assert!(prompts[1].contains("carousel"));
    }

    #[tokio::test]
    async fn test_exhausted_budget_reports_last_reply() {
        let client = Arc::new(ScriptedModelClient::new(["no", "still no", "{\"confidence\": 1}"]));
        let err = reasoner(&client).ask::<PageTyping>("classify").await.unwrap_err();
        match err {
            ReasoningError::Schema(e) => {
                assert_eq!(e.schema, "page_typing");
                assert_eq!(e.attempts, 3);
                assert_eq!(e.raw_response, "{\"confidence\": 1}");
                assert_eq!(e.violations[0].path, "page_type");
            }
            other => panic!("expected schema error, got {other:?}"),
        }
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_transient_model_error_is_retried_but_config_is_not() {
        let client = Arc::new(ScriptedModelClient::default());
        client.push_error(ModelError::Api { status: 503, body: String::new() });
        client.push_reply(r#"{"page_type": "news", "confidence": 1}"#);
        let typing: PageTyping = reasoner(&client).ask("classify").await.unwrap();
        assert_eq!(typing.page_type, PageType::News);

        let client = Arc::new(ScriptedModelClient::default());
        client.push_error(ModelError::Config("no key".into()));
        let err = reasoner(&client).ask::<PageTyping>("classify").await.unwrap_err();
        assert!(matches!(err, ReasoningError::Model(ModelError::Config(_))));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_backoff() {
        let client = Arc::new(ScriptedModelClient::new(["x", "x", "x"]));
        let policy = RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_secs(120),
            backoff_factor: 1.0,
            deadline: Duration::from_secs(60),
        };
        let err = Reasoner::new(client, policy)
            .ask::<PageTyping>("classify")
            .await
            .unwrap_err();
        assert!(matches!(err, ReasoningError::DeadlineExceeded(_)));
    }
}
