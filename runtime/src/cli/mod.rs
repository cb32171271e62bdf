// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Subcommand implementations for the `smartspider` binary.

pub mod args;
pub mod doctor;
pub mod run_cmd;
pub mod summarize_cmd;

pub use args::{ModelArgs, OutputArgs, Provider, RenderArgs};
