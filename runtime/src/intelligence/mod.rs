// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Strategy reuse across pages of a site.

pub mod cache;
pub mod url_pattern;

pub use cache::{StrategyCache, StrategyKey};
pub use url_pattern::predict_page_type;
