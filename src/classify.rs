//! Boundary to the external shopping-list classifier.
//!
//! The classifier itself (a hosted language model) lives outside this crate.
//! What lives here is the contract around it: typed failures, a bounded retry
//! policy, an explicit cache the caller owns, and validation of the reply
//! against the store's region names.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use common_types::RequiredList;
use log::{debug, info, warn};
use lru::LruCache;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ClassifyError {
    #[error("classifier request failed: {0}")]
    Network(String),

    #[error("classifier reply is not a JSON object: {0}")]
    Parse(String),

    #[error("classifier reply failed validation: {0}")]
    Validation(String),

    #[error("classification failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<ClassifyError>,
    },
}

/// Maps free-text shopping items onto region names.
pub trait Classifier {
    /// Identity of the backing model; part of the cache key.
    fn model_id(&self) -> &str;

    /// Raw reply text for one request.
    fn classify(&self, items: &[String], regions: &[String]) -> Result<String, ClassifyError>;
}

/// How long to keep going when the classifier fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; 0 behaves like 1.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn no_backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }
}

/// Eviction policy of a [`ClassificationCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Keep every entry for the cache's lifetime.
    Unbounded,
    /// Keep at most this many entries, dropping the least recently used.
    Lru(NonZeroUsize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    model: String,
    items: Vec<String>,
    regions: Vec<String>,
}

enum Store {
    Unbounded(HashMap<CacheKey, RequiredList>),
    Lru(LruCache<CacheKey, RequiredList>),
}

/// Memo of successful classifications, keyed by model, items and regions.
///
/// Owned by the caller and passed in by reference, so its lifetime and
/// sharing are explicit.
pub struct ClassificationCache {
    store: Store,
    hits: u64,
    misses: u64,
}

impl ClassificationCache {
    pub fn new(policy: CachePolicy) -> Self {
        let store = match policy {
            CachePolicy::Unbounded => Store::Unbounded(HashMap::new()),
            CachePolicy::Lru(cap) => Store::Lru(LruCache::new(cap)),
        };
        Self { store, hits: 0, misses: 0 }
    }

    fn get(&mut self, key: &CacheKey) -> Option<RequiredList> {
        let found = match &mut self.store {
            Store::Unbounded(map) => map.get(key).cloned(),
            Store::Lru(lru) => lru.get(key).cloned(),
        };
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    fn insert(&mut self, key: CacheKey, value: RequiredList) {
        match &mut self.store {
            Store::Unbounded(map) => {
                map.insert(key, value);
            }
            Store::Lru(lru) => {
                lru.put(key, value);
            }
        }
    }

    pub fn len(&self) -> usize {
        match &self.store {
            Store::Unbounded(map) => map.len(),
            Store::Lru(lru) => lru.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

static FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("invalid fence regex"));

/// Turn a reply into a validated [`RequiredList`].
///
/// The reply may be a bare JSON object or one inside a fenced code block.
/// Keys must name known regions (case-insensitive, normalized to the
/// region's own spelling) and values must be arrays of strings.
pub fn parse_classifier_reply(reply: &str, regions: &[String]) -> Result<RequiredList, ClassifyError> {
    let body = FENCED
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply)
        .trim();

    let value: Value = serde_json::from_str(body).map_err(|e| ClassifyError::Parse(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(ClassifyError::Parse("expected a JSON object".into()));
    };

    let mut merged: HashMap<String, Vec<String>> = HashMap::new();
    for (key, items) in map {
        let region = resolve_region(&key, regions)
            .ok_or_else(|| ClassifyError::Validation(format!("unknown region '{key}'")))?;
        let Value::Array(items) = items else {
            return Err(ClassifyError::Validation(format!(
                "items for '{key}' are not an array"
            )));
        };
        let entry = merged.entry(region.to_string()).or_default();
        for item in items {
            match item {
                Value::String(s) => entry.push(s),
                other => {
                    return Err(ClassifyError::Validation(format!(
                        "item {other} for '{key}' is not a string"
                    )))
                }
            }
        }
    }
    Ok(merged.into_iter().collect())
}

fn resolve_region<'a>(key: &str, regions: &'a [String]) -> Option<&'a str> {
    regions
        .iter()
        .find(|r| r.as_str() == key)
        .or_else(|| regions.iter().find(|r| r.eq_ignore_ascii_case(key)))
        .map(String::as_str)
}

/// Classify `items` against `regions`, consulting `cache` first and retrying
/// per `policy`. Only successful, validated replies are cached.
pub fn classify_items(
    classifier: &dyn Classifier,
    cache: &mut ClassificationCache,
    policy: &RetryPolicy,
    items: &[String],
    regions: &[String],
) -> Result<RequiredList, ClassifyError> {
    if items.is_empty() {
        return Ok(RequiredList::new());
    }
    let key = CacheKey {
        model: classifier.model_id().to_string(),
        items: items.to_vec(),
        regions: regions.to_vec(),
    };
    if let Some(hit) = cache.get(&key) {
        debug!("Classification cache hit for {} items", items.len());
        return Ok(hit);
    }

    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = classifier
            .classify(items, regions)
            .and_then(|reply| parse_classifier_reply(&reply, regions));
        match result {
            Ok(list) => {
                info!("Classified {} items on attempt {}", items.len(), attempt);
                cache.insert(key, list.clone());
                return Ok(list);
            }
            Err(e) if attempt >= attempts => {
                return Err(ClassifyError::Exhausted {
                    attempts,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                warn!("Classification attempt {}/{} failed: {}", attempt, attempts, e);
                if !policy.backoff.is_zero() {
                    thread::sleep(policy.backoff);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    struct Scripted {
        replies: RefCell<VecDeque<Result<String, ClassifyError>>>,
        calls: Cell<u32>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<&str, ClassifyError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into_iter().map(|r| r.map(String::from)).collect()),
                calls: Cell::new(0),
            }
        }
    }

    impl Classifier for Scripted {
        fn model_id(&self) -> &str {
            "scripted-1"
        }

        fn classify(&self, _items: &[String], _regions: &[String]) -> Result<String, ClassifyError> {
            self.calls.set(self.calls.get() + 1);
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(ClassifyError::Network("script exhausted".into())))
        }
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn regions() -> Vec<String> {
        strings(&["Dairy", "Produce", "entrance", "checkout"])
    }

    #[test]
    fn parses_fenced_reply_and_normalizes_names() {
        let reply = "Here you go:\n```json\n{\"dairy\": [\"milk\", \"cheese\"], \"Produce\": [\"apples\"]}\n```";
        let list = parse_classifier_reply(reply, &regions()).unwrap();
        assert_eq!(list.items("Dairy"), strings(&["milk", "cheese"]));
        assert_eq!(list.items("Produce"), strings(&["apples"]));
        assert!(list.items("dairy").is_empty());
    }

    #[test]
    fn rejects_bad_replies_with_typed_errors() {
        let r = regions();
        assert!(matches!(parse_classifier_reply("not json", &r), Err(ClassifyError::Parse(_))));
        assert!(matches!(parse_classifier_reply("[1, 2]", &r), Err(ClassifyError::Parse(_))));
        assert!(matches!(
            parse_classifier_reply(r#"{"Bakery": ["bread"]}"#, &r),
            Err(ClassifyError::Validation(_))
        ));
        assert!(matches!(
            parse_classifier_reply(r#"{"Dairy": "milk"}"#, &r),
            Err(ClassifyError::Validation(_))
        ));
        assert!(matches!(
            parse_classifier_reply(r#"{"Dairy": [1]}"#, &r),
            Err(ClassifyError::Validation(_))
        ));
    }

    #[test]
    fn retries_until_a_valid_reply() {
        let classifier = Scripted::new(vec![
            Err(ClassifyError::Network("timeout".into())),
            Ok("garbage"),
            Ok(r#"{"Dairy": ["milk"]}"#),
        ]);
        let mut cache = ClassificationCache::new(CachePolicy::Unbounded);
        let list = classify_items(
            &classifier,
            &mut cache,
            &RetryPolicy::no_backoff(4),
            &strings(&["milk"]),
            &regions(),
        )
        .unwrap();
        assert_eq!(list.items("Dairy"), strings(&["milk"]));
        assert_eq!(classifier.calls.get(), 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn exhausted_retries_report_the_last_error() {
        let classifier = Scripted::new(vec![
            Err(ClassifyError::Network("down".into())),
            Ok(r#"{"Bakery": ["bread"]}"#),
        ]);
        let mut cache = ClassificationCache::new(CachePolicy::Unbounded);
        let err = classify_items(
            &classifier,
            &mut cache,
            &RetryPolicy::no_backoff(2),
            &strings(&["bread"]),
            &regions(),
        )
        .unwrap_err();
        match err {
            ClassifyError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, ClassifyError::Validation(_)));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let classifier = Scripted::new(vec![Ok(r#"{"Produce": ["kale"]}"#)]);
        let mut cache = ClassificationCache::new(CachePolicy::Unbounded);
        let list = classify_items(
            &classifier,
            &mut cache,
            &RetryPolicy::no_backoff(0),
            &strings(&["kale"]),
            &regions(),
        )
        .unwrap();
        assert_eq!(list.items("Produce"), strings(&["kale"]));
    }

    #[test]
    fn cache_hit_skips_the_classifier() {
        let classifier = Scripted::new(vec![Ok(r#"{"Dairy": ["milk"]}"#)]);
        let mut cache = ClassificationCache::new(CachePolicy::Unbounded);
        let items = strings(&["milk"]);
        let policy = RetryPolicy::no_backoff(1);
        let first = classify_items(&classifier, &mut cache, &policy, &items, &regions()).unwrap();
        let second = classify_items(&classifier, &mut cache, &policy, &items, &regions()).unwrap();
        assert_eq!(first, second);
        assert_eq!(classifier.calls.get(), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn lru_cache_evicts_oldest_entry() {
        let classifier = Scripted::new(vec![
            Ok(r#"{"Dairy": ["milk"]}"#),
            Ok(r#"{"Produce": ["kale"]}"#),
            Ok(r#"{"Dairy": ["milk"]}"#),
        ]);
        let cap = NonZeroUsize::new(1).unwrap();
        let mut cache = ClassificationCache::new(CachePolicy::Lru(cap));
        let policy = RetryPolicy::no_backoff(1);
        let r = regions();
        classify_items(&classifier, &mut cache, &policy, &strings(&["milk"]), &r).unwrap();
        classify_items(&classifier, &mut cache, &policy, &strings(&["kale"]), &r).unwrap();
        classify_items(&classifier, &mut cache, &policy, &strings(&["milk"]), &r).unwrap();
        assert_eq!(classifier.calls.get(), 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn empty_list_needs_no_classifier() {
        let classifier = Scripted::new(vec![]);
        let mut cache = ClassificationCache::new(CachePolicy::Unbounded);
        let list =
            classify_items(&classifier, &mut cache, &RetryPolicy::default(), &[], &regions()).unwrap();
        assert!(list.is_empty());
        assert_eq!(classifier.calls.get(), 0);
    }
}
