// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! The model client seam.

use async_trait::async_trait;
use smartspider::ModelError;

/// A language model reachable by prompt.
///
/// Implementations do no retrying of their own; retry and backoff policy
/// lives in [`super::Reasoner`].
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Provider name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Send one prompt and return the raw text reply.
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}
