// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page acquisition: the static HTTP backend, the dynamic-content heuristic
//! and the render escalation engine that ties them to the browser backends.

pub mod escalation;
pub mod http_client;
pub mod js_heuristic;

pub use escalation::{normalize_url, RenderEngine};
