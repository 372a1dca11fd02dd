//! Cache module for persisting Firefly III responses to disk
//!
//! Settings and cached resources share one JSON document guarded by a single
//! lock. Entries expire after a fixed age, but expired entries are still
//! returned so callers can fall back to them when Firefly III is unreachable.

mod entry;
pub mod staleness;
mod store;

pub use entry::{format_timestamp, CacheEntries, CachedResource, LAST_SYNC_KEY, TIMESTAMP_FORMAT};
pub use staleness::{is_stale, is_stale_at, CACHE_MAX_AGE_HOURS};
pub use store::{
    ConfigStore, Document, StoreError, CACHE_SECTION, CONFIG_FILENAME, SETTINGS_SECTION,
};
