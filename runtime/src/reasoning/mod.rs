// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Schema-validating reasoning layer.
//!
//! Page typing, intent parsing and strategy building all go through
//! [`Reasoner::ask`]: prompt, parse, heal once, validate, and on failure
//! re-ask with the diagnostics until the retry budget is spent. Nothing
//! unvalidated leaves this module.

pub mod ask;
pub mod client;
pub mod gemini;
pub mod intent;
pub mod mock;
pub mod openai;
pub mod page_typing;
pub mod prompts;
pub mod strategy;

pub use ask::Reasoner;
pub use client::ModelClient;
pub use gemini::GeminiClient;
pub use intent::IntentParser;
pub use mock::{MockModelClient, ScriptedModelClient};
pub use openai::OpenAiClient;
pub use page_typing::PageClassifier;
pub use strategy::StrategyBuilder;
