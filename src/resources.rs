//! Read-through cache for Firefly III list resources
//!
//! Serves fresh cache entries directly, refreshes stale or missing ones from
//! Firefly III, and falls back to stale data when the refresh fails.

use chrono::{NaiveDateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::{is_stale_at, CacheEntries};
use crate::firefly::{Params, Upstream, UpstreamError};

/// Source of the current naive UTC time
pub type Clock = fn() -> NaiveDateTime;

fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// A cached Firefly III resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Accounts,
    Budgets,
    Categories,
    Tags,
}

impl Resource {
    /// Logical name used as the cache key prefix
    pub fn name(self) -> &'static str {
        match self {
            Resource::Accounts => "accounts",
            Resource::Budgets => "budgets",
            Resource::Categories => "categories",
            Resource::Tags => "tags",
        }
    }

    /// Path below `/api/v1/` on the Firefly III side
    pub fn path(self) -> &'static str {
        // Names and upstream paths coincide for every list resource today
        self.name()
    }
}

/// Builds the cache key for a resource and its query parameters
///
/// Parameters are sorted by key so insertion order does not matter, and
/// `None` values are dropped. Without any present parameter the key is the
/// bare name.
pub fn cache_key(name: &str, params: &Params<'_>) -> String {
    let mut present: Vec<(&str, &str)> = params
        .iter()
        .filter_map(|(key, value)| value.map(|value| (*key, value)))
        .collect();
    if present.is_empty() {
        return name.to_string();
    }

    present.sort_unstable();
    let suffix = present
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{name}?{suffix}")
}

/// Fetches resources through the persisted cache
///
/// Two concurrent refreshes of the same stale key both go to Firefly III and
/// the later write wins.
#[derive(Clone)]
pub struct ResourceCache {
    entries: CacheEntries,
    upstream: Arc<dyn Upstream>,
    clock: Clock,
}

impl ResourceCache {
    pub fn new(entries: CacheEntries, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            entries,
            upstream,
            clock: utc_now,
        }
    }

    /// Replaces the clock used for staleness checks and sync timestamps
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Fetches a known resource
    pub async fn fetch(
        &self,
        resource: Resource,
        params: &Params<'_>,
    ) -> Result<Value, UpstreamError> {
        self.fetch_cached(resource.name(), resource.path(), params)
            .await
    }

    /// Fetches `path` from Firefly III, caching the result under `name` and `params`
    ///
    /// # Behavior
    /// - Fresh cached data is returned without contacting Firefly III
    /// - Otherwise the data is fetched; unchanged data only advances the sync
    ///   time, changed data replaces the entry
    /// - When the fetch fails, cached data is returned even if stale and its
    ///   sync time is left alone
    /// - Without cached data the fetch error is returned
    pub async fn fetch_cached(
        &self,
        name: &str,
        path: &str,
        params: &Params<'_>,
    ) -> Result<Value, UpstreamError> {
        let key = cache_key(name, params);
        let cached = {
            let key = key.clone();
            self.with_entries(move |entries| entries.get(&key))
                .await
                .unwrap_or_default()
        };

        let cached_data = match cached.data {
            Some(data) if !is_stale_at(cached.last_synced_at.as_deref(), (self.clock)()) => {
                tracing::debug!(%key, "serving fresh cache entry");
                return Ok(data);
            }
            other => other,
        };

        tracing::debug!(%key, cached = cached_data.is_some(), "refreshing from firefly");
        match self.upstream.request(Method::GET, path, params, None).await {
            Ok(fresh) => {
                let now = (self.clock)();
                if cached_data.as_ref() == Some(&fresh) {
                    self.with_entries(move |entries| entries.touch(&key, now)).await;
                } else {
                    let data = fresh.clone();
                    self.with_entries(move |entries| entries.put(&key, &data, now)).await;
                }
                Ok(fresh)
            }
            Err(err) if err.is_fetch_failure() => match cached_data {
                Some(stale) => {
                    tracing::warn!(%key, error = %err, "firefly unavailable, serving stale cache entry");
                    Ok(stale)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Runs a cache operation on the blocking thread pool
    ///
    /// The store does file I/O under a `std::sync::Mutex`, which must not
    /// happen on an async worker. `None` when the task panicked.
    async fn with_entries<R>(
        &self,
        op: impl FnOnce(&CacheEntries) -> R + Send + 'static,
    ) -> Option<R>
    where
        R: Send + 'static,
    {
        let entries = self.entries.clone();
        match tokio::task::spawn_blocking(move || op(&entries)).await {
            Ok(result) => Some(result),
            Err(err) => {
                tracing::error!(error = %err, "cache task failed");
                None
            }
        }
    }
}
