//! Error kinds surfaced by the pipeline.
//!
//! A missing field is never an error: partial records are a normal outcome.

use crate::types::BackendAttempt;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// One schema violation in a model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the offending value (`field_selectors.title`), or `$`.
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Join violations into a single diagnostic line.
pub fn describe_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// No render backend produced any content.
#[derive(Debug, Clone, Error)]
#[error("no render backend produced content for {url} ({} attempt(s))", .attempts.len())]
pub struct FetchFailure {
    pub url: String,
    pub attempts: Vec<BackendAttempt>,
}

/// Model output never conformed to the expected schema.
#[derive(Debug, Clone, Error)]
#[error(
    "{schema} reply failed validation after {attempts} attempt(s): {}",
    describe_violations(.violations)
)]
pub struct SchemaValidationError {
    pub schema: &'static str,
    pub raw_response: String,
    pub violations: Vec<Violation>,
    pub attempts: u32,
}

/// The selector engine itself failed. Zero matches is not an execution error.
#[derive(Debug, Clone, Error)]
#[error("selector `{selector}` could not be applied: {reason}")]
pub struct ExecutionError {
    pub selector: String,
    pub reason: String,
}

/// Transport-level failure of the model client.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// Missing API key or invalid settings
    #[error("model client configuration error: {0}")]
    Config(String),

    /// Connection failed or timed out
    #[error("model network error: {0}")]
    Network(String),

    /// Non-2xx response from the endpoint
    #[error("model API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// Response envelope could not be decoded
    #[error("model response could not be decoded: {0}")]
    Decode(String),
}

impl ModelError {
    /// Rate limiting, server errors and network failures are worth another
    /// attempt; configuration and decode errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Network(_) => true,
            ModelError::Api { status, .. } => *status == 429 || *status >= 500,
            ModelError::Config(_) | ModelError::Decode(_) => false,
        }
    }
}

/// Failures of a single reasoning call.
#[derive(Debug, Clone, Error)]
pub enum ReasoningError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Schema(#[from] SchemaValidationError),

    #[error("reasoning deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

/// Any failure that aborts processing of one page.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    #[error(transparent)]
    SchemaValidation(#[from] SchemaValidationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("cancelled")]
    Cancelled,
}

impl From<ReasoningError> for PipelineError {
    fn from(err: ReasoningError) -> Self {
        match err {
            ReasoningError::Model(e) => PipelineError::Model(e),
            ReasoningError::Schema(e) => PipelineError::SchemaValidation(e),
            ReasoningError::DeadlineExceeded(d) => PipelineError::DeadlineExceeded(d),
        }
    }
}

impl PipelineError {
    /// Short machine-readable kind, used in batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "fetch_failure",
            PipelineError::SchemaValidation(_) => "schema_validation_error",
            PipelineError::Execution(_) => "execution_error",
            PipelineError::Model(_) => "model_error",
            PipelineError::DeadlineExceeded(_) => "deadline_exceeded",
            PipelineError::Cancelled => "cancelled",
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttemptOutcome, RenderMode};

    #[test]
    fn test_fetch_failure_message_counts_attempts() {
        let err = FetchFailure {
            url: "https://example.com".into(),
            attempts: vec![
                BackendAttempt::new(RenderMode::Static, AttemptOutcome::TimedOut { timeout_ms: 10 }),
                BackendAttempt::new(RenderMode::Playwright, AttemptOutcome::Skipped),
            ],
        };
        assert_eq!(
            err.to_string(),
            "no render backend produced content for https://example.com (2 attempt(s))"
        );
    }

    #[test]
    fn test_schema_error_lists_violations() {
        let err = SchemaValidationError {
            schema: "page_typing",
            raw_response: "{}".into(),
            violations: vec![
                Violation::new("page_type", "required field missing"),
                Violation::new("confidence", "required field missing"),
            ],
            attempts: 3,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("page_typing reply failed validation after 3 attempt(s)"));
        assert!(msg.contains("page_type: required field missing; confidence"));
    }

    #[test]
    fn test_transient_model_errors() {
        assert!(ModelError::Network("reset".into()).is_transient());
        assert!(ModelError::Api { status: 429, body: String::new() }.is_transient());
        assert!(!ModelError::Api { status: 401, body: String::new() }.is_transient());
        assert!(!ModelError::Config("no key".into()).is_transient());
    }

    #[test]
    fn test_reasoning_error_maps_to_pipeline_kind() {
        let err: PipelineError =
            ReasoningError::DeadlineExceeded(Duration::from_secs(1)).into();
        assert_eq!(err.kind(), "deadline_exceeded");
    }
}
