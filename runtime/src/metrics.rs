// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Evaluation metrics: extraction quality against gold records, page-type
//! accuracy and stage timing statistics.

use crate::pipeline::StageTimings;
use indexmap::IndexMap;
use serde::Serialize;
use smartspider::{FieldValue, PageType};
use std::collections::BTreeSet;

/// Minimum similarity for a predicted string to count as a hit.
pub const STRING_MATCH_THRESHOLD: f64 = 0.7;

/// Free-text fields scored by [`fuzzy_similarity`].
pub const FUZZY_FIELDS: [&str; 3] = ["content", "title", "sub_comments"];

pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FieldScore {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub tp: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl FieldScore {
    fn from_counts(tp: usize, fp: usize, fn_: usize) -> Self {
        let precision = tp as f64 / (tp + fp).max(1) as f64;
        let recall = tp as f64 / (tp + fn_).max(1) as f64;
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self {
            precision,
            recall,
            f1,
            tp,
            fp,
            fn_,
        }
    }
}

fn flat_items(value: Option<&FieldValue>) -> BTreeSet<String> {
    match value {
        Some(FieldValue::List(items)) => items.iter().map(FieldValue::to_flat_string).collect(),
        Some(other) if !other.is_empty() => BTreeSet::from([other.to_flat_string()]),
        _ => BTreeSet::new(),
    }
}

/// Precision/recall/F1 of `predicted` against `gold`.
///
/// List fields count set overlap. Scalars are a hit when similarity reaches
/// [`STRING_MATCH_THRESHOLD`]; a miss counts against both precision and
/// recall. Empty gold scalars are skipped.
pub fn field_precision_recall(
    gold: &IndexMap<String, FieldValue>,
    predicted: &IndexMap<String, FieldValue>,
) -> FieldScore {
    let (mut tp, mut fp, mut fn_) = (0, 0, 0);

    for (field, gold_value) in gold {
        let pred_value = predicted.get(field);
        match gold_value {
            FieldValue::List(_) => {
                let gold_set = flat_items(Some(gold_value));
                let pred_set = flat_items(pred_value);
                let hits = gold_set.intersection(&pred_set).count();
                tp += hits;
                fp += pred_set.len() - hits;
                fn_ += gold_set.len() - hits;
            }
            _ => {
                let gold_text = gold_value.to_flat_string();
                let gold_text = gold_text.trim();
                if gold_text.is_empty() {
                    continue;
                }
                let pred_text = pred_value.map(FieldValue::to_flat_string).unwrap_or_default();
                let pred_text = pred_text.trim();
                if pred_text.is_empty() {
                    fn_ += 1;
                } else if similarity(gold_text, pred_text) >= STRING_MATCH_THRESHOLD {
                    tp += 1;
                } else {
                    fp += 1;
                    fn_ += 1;
                }
            }
        }
    }

    FieldScore::from_counts(tp, fp, fn_)
}

/// Mean similarity over the free-text fields present in `gold`.
///
/// For lists, each gold item takes its best match among the predicted
/// items. Returns 0.0 when no field could be compared.
pub fn fuzzy_similarity(
    gold: &IndexMap<String, FieldValue>,
    predicted: &IndexMap<String, FieldValue>,
) -> f64 {
    let mut scores = Vec::new();

    for key in FUZZY_FIELDS {
        let (Some(gold_value), Some(pred_value)) = (gold.get(key), predicted.get(key)) else {
            continue;
        };
        match (gold_value, pred_value) {
            (FieldValue::Text(g), FieldValue::Text(p)) => {
                scores.push(similarity(g.trim(), p.trim()));
            }
            (FieldValue::List(g), FieldValue::List(p)) if !g.is_empty() => {
                let best: Vec<f64> = g
                    .iter()
                    .map(|gi| {
                        let gi = gi.to_flat_string();
                        p.iter()
                            .map(|pi| similarity(&gi, &pi.to_flat_string()))
                            .fold(0.0, f64::max)
                    })
                    .collect();
                scores.push(mean(&best));
            }
            _ => {}
        }
    }

    mean(&scores)
}

/// Share of pages whose predicted type matches the gold type.
pub fn page_type_accuracy(pairs: &[(PageType, PageType)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let correct = pairs.iter().filter(|(gold, pred)| gold == pred).count();
    correct as f64 / pairs.len() as f64
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

/// Population statistics per stage, in milliseconds. Stages a page never
/// reached do not contribute a sample.
pub fn aggregate_timings(timings: &[StageTimings]) -> IndexMap<&'static str, TimingStats> {
    let mut buckets: IndexMap<&'static str, Vec<f64>> = IndexMap::new();
    for t in timings {
        for (stage, ms) in t.stages() {
            buckets.entry(stage).or_default().push(ms as f64);
        }
    }

    buckets
        .into_iter()
        .map(|(stage, values)| {
            let m = mean(&values);
            let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
            let stats = TimingStats {
                mean: m,
                std: var.sqrt(),
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                samples: values.len(),
            };
            (stage, stats)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, FieldValue)]) -> IndexMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn list(items: &[&str]) -> FieldValue {
        FieldValue::List(items.iter().map(|s| FieldValue::from(*s)).collect())
    }

    #[test]
    fn test_precision_recall_mixed_fields() {
        let gold = fields(&[
            ("title", "Rust 2026 roadmap published".into()),
            ("author", "Jane Doe".into()),
            ("tags", list(&["rust", "lang", "news"])),
            ("summary", "".into()),
        ]);
        let pred = fields(&[
            ("title", "Rust 2026 roadmap published!".into()),
            ("author", "Completely different".into()),
            ("tags", list(&["rust", "news", "extra"])),
        ]);

        let score = field_precision_recall(&gold, &pred);
        // title hit; author fp+fn; tags 2 hits, 1 fp, 1 fn; empty summary skipped
        assert_eq!((score.tp, score.fp, score.fn_), (3, 2, 2));
        assert!((score.precision - 0.6).abs() < 1e-9);
        assert!((score.recall - 0.6).abs() < 1e-9);
        assert!((score.f1 - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_missing_prediction_is_false_negative() {
        let gold = fields(&[("price", FieldValue::Number(12.5))]);
        let score = field_precision_recall(&gold, &IndexMap::new());
        assert_eq!((score.tp, score.fp, score.fn_), (0, 0, 1));
        assert_eq!(score.f1, 0.0);
    }

    #[test]
    fn test_fuzzy_similarity_over_text_and_lists() {
        let gold = fields(&[
            ("title", "abcd".into()),
            ("sub_comments", list(&["good", "bad"])),
        ]);
        let pred = fields(&[
            ("title", "abcd".into()),
            ("sub_comments", list(&["good"])),
        ]);
        // title 1.0; comments: good→1.0, bad→best of "good" (0.25); mean 0.625
        let score = fuzzy_similarity(&gold, &pred);
        assert!((score - (1.0 + 0.625) / 2.0).abs() < 1e-9);
        assert_eq!(fuzzy_similarity(&IndexMap::new(), &pred), 0.0);
    }

    #[test]
    fn test_page_type_accuracy() {
        let pairs = [
            (PageType::News, PageType::News),
            (PageType::List, PageType::Product),
        ];
        assert_eq!(page_type_accuracy(&pairs), 0.5);
        assert_eq!(page_type_accuracy(&[]), 0.0);
    }

    #[test]
    fn test_aggregate_timings_skips_unreached_stages() {
        let a = StageTimings {
            fetch_ms: Some(100),
            summarize_ms: Some(10),
            ..Default::default()
        };
        let b = StageTimings {
            fetch_ms: Some(300),
            ..Default::default()
        };
        let stats = aggregate_timings(&[a, b]);
        let fetch = stats["fetch"];
        assert_eq!(fetch.mean, 200.0);
        assert_eq!(fetch.std, 100.0);
        assert_eq!((fetch.min, fetch.max, fetch.samples), (100.0, 300.0, 2));
        assert_eq!(stats["summarize"].samples, 1);
        assert!(!stats.contains_key("execute"));
    }
}
