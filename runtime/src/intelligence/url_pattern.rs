// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page type prediction from URL shape alone.
//!
//! Used before a page is fetched, when the only evidence is its URL. A
//! collection word followed by another segment (`/news/launch-day`,
//! `/products/blue-kettle`) predicts the detail type; the same word closing
//! the path predicts a listing. Returns `None` rather than guessing.

use regex::Regex;
use smartspider::PageType;
use std::sync::LazyLock;
use url::Url;

static DATE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:19|20)\d{2}/[01]?\d/").expect("date path regex is valid"));

const DETAIL_PARENTS: &[(&[&str], PageType)] = &[
    (
        &["news", "article", "articles", "post", "posts", "blog", "story", "stories"],
        PageType::News,
    ),
    (&["product", "products", "item", "items", "dp", "p"], PageType::Product),
    (&["thread", "threads", "topic", "topics"], PageType::Forum),
    (
        &["user", "users", "profile", "profiles", "member", "members", "u"],
        PageType::Profile,
    ),
];

const GALLERY_WORDS: &[&str] = &["gallery", "galleries", "album", "albums", "photos"];
const FORUM_WORDS: &[&str] = &["forum", "forums", "discussion", "discussions"];
const LIST_WORDS: &[&str] = &[
    "list", "category", "categories", "tag", "tags", "search", "archive", "archives",
    "catalog", "collection", "collections", "page",
];
const PAGINATION_PARAMS: &[&str] = &["page", "p", "pg", "offset"];

pub fn predict_page_type(url: &Url) -> Option<PageType> {
    let segments: Vec<String> = url
        .path_segments()
        .map(|s| s.filter(|s| !s.is_empty()).map(str::to_ascii_lowercase).collect())
        .unwrap_or_default();

    // Detail evidence first: it is the more specific signal.
    for (i, segment) in segments.iter().enumerate() {
        if segment.len() > 1 && segment.starts_with('@') {
            return Some(PageType::Profile);
        }
        if i + 1 < segments.len() {
            if let Some(page_type) = detail_parent(segment) {
                return Some(page_type);
            }
        }
    }
    if DATE_PATH.is_match(url.path()) {
        return Some(PageType::News);
    }

    for segment in &segments {
        if GALLERY_WORDS.contains(&segment.as_str()) {
            return Some(PageType::Gallery);
        }
        if FORUM_WORDS.contains(&segment.as_str()) {
            return Some(PageType::Forum);
        }
        if LIST_WORDS.contains(&segment.as_str()) {
            return Some(PageType::List);
        }
    }
    if segments.last().is_some_and(|s| detail_parent(s).is_some()) {
        return Some(PageType::List);
    }
    if url
        .query_pairs()
        .any(|(key, _)| PAGINATION_PARAMS.contains(&&*key))
    {
        return Some(PageType::List);
    }
    None
}

fn detail_parent(segment: &str) -> Option<PageType> {
    DETAIL_PARENTS
        .iter()
        .find(|(words, _)| words.contains(&segment))
        .map(|(_, page_type)| *page_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predict(url: &str) -> Option<PageType> {
        predict_page_type(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_detail_under_collection_word() {
        assert_eq!(predict("https://example.com/news/launch-day"), Some(PageType::News));
        assert_eq!(predict("https://shop.example.com/products/blue-kettle"), Some(PageType::Product));
        assert_eq!(predict("https://shop.example.com/p/1"), Some(PageType::Product));
        assert_eq!(predict("https://forum.example.com/thread/42"), Some(PageType::Forum));
        assert_eq!(predict("https://social.example.com/@ada"), Some(PageType::Profile));
        assert_eq!(predict("https://example.com/2024/05/launch"), Some(PageType::News));
    }

    #[test]
    fn test_listing_shapes() {
        assert_eq!(predict("https://example.com/news"), Some(PageType::List));
        assert_eq!(predict("https://shop.example.com/category/kettles"), Some(PageType::List));
        assert_eq!(predict("https://shop.example.com/list?page=2"), Some(PageType::List));
        assert_eq!(predict("https://shop.example.com/?page=3"), Some(PageType::List));
        assert_eq!(predict("https://example.com/gallery/summer"), Some(PageType::Gallery));
    }

    #[test]
    fn test_no_evidence() {
        assert_eq!(predict("https://example.com/"), None);
        assert_eq!(predict("https://example.com/about-us"), None);
    }
}
