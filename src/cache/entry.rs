//! Cached resource entries inside the persisted document

use chrono::NaiveDateTime;
use serde_json::{json, Value};
use std::sync::Arc;

use super::store::{section_mut, ConfigStore, CACHE_SECTION};

/// Key of the sync timestamp inside a cache entry
pub const LAST_SYNC_KEY: &str = "last_synced_at";

/// Key of the payload inside a cache entry
pub const DATA_KEY: &str = "data";

/// On-disk timestamp format, second precision
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Result of reading a cache entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedResource {
    /// The cached payload, if any
    pub data: Option<Value>,
    /// When the payload was last confirmed against upstream
    pub last_synced_at: Option<String>,
}

/// Formats a sync time the way it is stored on disk
pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Reads, replaces and touches entries of the `resource_cache` section
#[derive(Debug, Clone)]
pub struct CacheEntries {
    store: Arc<ConfigStore>,
}

impl CacheEntries {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    /// Returns the cached payload and its sync time
    ///
    /// Both are absent when the key is missing or its value is not an object.
    pub fn get(&self, key: &str) -> CachedResource {
        self.store.read(|document| {
            let entry = document
                .get(CACHE_SECTION)
                .and_then(Value::as_object)
                .and_then(|cache| cache.get(key))
                .and_then(Value::as_object);

            match entry {
                Some(entry) => CachedResource {
                    data: entry.get(DATA_KEY).filter(|data| !data.is_null()).cloned(),
                    last_synced_at: entry
                        .get(LAST_SYNC_KEY)
                        .and_then(Value::as_str)
                        .map(str::to_string),
                },
                None => CachedResource::default(),
            }
        })
    }

    /// Stores `data` under `key` with `now` as its sync time, replacing any previous entry
    pub fn put(&self, key: &str, data: &Value, now: NaiveDateTime) {
        let entry = json!({
            DATA_KEY: data,
            LAST_SYNC_KEY: format_timestamp(now),
        });
        self.store.modify(|document| {
            section_mut(document, CACHE_SECTION).insert(key.to_string(), entry);
            true
        });
    }

    /// Advances the sync time of an existing entry without touching its payload
    ///
    /// Absent keys are left absent.
    pub fn touch(&self, key: &str, now: NaiveDateTime) {
        let timestamp = format_timestamp(now);
        self.store.modify(|document| {
            let entry = document
                .get_mut(CACHE_SECTION)
                .and_then(Value::as_object_mut)
                .and_then(|cache| cache.get_mut(key))
                .and_then(Value::as_object_mut);

            match entry {
                Some(entry) => {
                    entry.insert(LAST_SYNC_KEY.to_string(), Value::String(timestamp));
                    true
                }
                None => false,
            }
        });
    }
}
