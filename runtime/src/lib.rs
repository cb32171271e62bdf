// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! SmartSpider runtime: render escalation, schema-validated reasoning and
//! deterministic strategy execution over fetched pages.
//!
//! The [`pipeline::Pipeline`] ties the stages together; the `smartspider`
//! binary is a thin CLI over it.

pub mod acquisition;
pub mod cli;
pub mod config;
pub mod extraction;
pub mod intelligence;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod reasoning;
pub mod renderer;

pub use config::Settings;
pub use pipeline::{BatchReport, PageReport, PageState, Pipeline};
