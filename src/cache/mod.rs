//! Time-based dedup cache.
//!
//! Remembers which items were already reported, keyed by
//! [`Item::cache_key`](crate::domain::Item::cache_key). Every age comparison
//! in a run uses the same pinned "now", so a run can be replayed at any
//! point in time.
//!
//! Entries expire once `now - last_seen` is strictly greater than the
//! retention of the feed they belong to. Feeds with zero retention (and
//! feeds that are no longer configured) never keep entries.

mod persist;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::FeedDescriptor;

/// One remembered item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// URL of the feed that owns the item.
    pub feed: String,
    pub last_seen: DateTime<Utc>,
}

pub struct FeedCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    retention: HashMap<String, Duration>,
    now: DateTime<Utc>,
    added: AtomicUsize,
    expired: AtomicUsize,
}

impl FeedCache {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retention: HashMap::new(),
            now,
            added: AtomicUsize::new(0),
            expired: AtomicUsize::new(0),
        }
    }

    /// Empty cache that knows the retention of every given feed.
    pub fn for_feeds<'a, I>(now: DateTime<Utc>, feeds: I) -> Self
    where
        I: IntoIterator<Item = &'a FeedDescriptor>,
    {
        let mut cache = Self::new(now);
        for feed in feeds {
            cache.register_feed(feed);
        }
        cache
    }

    pub fn register_feed(&mut self, feed: &FeedDescriptor) {
        self.retention
            .insert(feed.url().to_string(), feed.retention());
    }

    /// The pinned current time used for every age comparison.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn retention_for(&self, feed: &str) -> Duration {
        self.retention.get(feed).copied().unwrap_or_else(Duration::zero)
    }

    /// True iff no entry exists for `key` or the entry outlived its feed's
    /// retention.
    pub fn is_new(&self, key: &str) -> bool {
        match self.read().get(key) {
            None => true,
            Some(entry) => self.is_expired(entry, self.now),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.read().get(key).cloned()
    }

    /// Insert an entry or refresh the timestamp of an existing one.
    pub fn mark_seen(&self, key: &str, feed: &str, timestamp: DateTime<Utc>) {
        let mut entries = self.write();
        match entries.get_mut(key) {
            Some(entry) => {
                entry.last_seen = timestamp;
                entry.feed = feed.to_string();
            }
            None => {
                entries.insert(
                    key.to_string(),
                    CacheEntry {
                        key: key.to_string(),
                        feed: feed.to_string(),
                        last_seen: timestamp,
                    },
                );
                self.added.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Remove a single entry. Returns the removed entry, if any.
    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.write().remove(key)
    }

    /// Drop every entry whose retention has elapsed relative to `now`.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        let removed = before - entries.len();
        self.expired.fetch_add(removed, Ordering::Relaxed);
        if removed > 0 {
            tracing::debug!("Pruned {} expired cache entries", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Entries created during this run.
    pub fn added_count(&self) -> usize {
        self.added.load(Ordering::Relaxed)
    }

    /// Entries pruned during this run.
    pub fn expired_count(&self) -> usize {
        self.expired.load(Ordering::Relaxed)
    }

    /// All entries, sorted by key.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<_> = self.read().values().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Read-only lookup handle given to plugins.
    pub fn view(&self) -> CacheView<'_> {
        CacheView { cache: self }
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        let retention = self.retention_for(&entry.feed);
        retention <= Duration::zero() || now - entry.last_seen > retention
    }

    fn insert_loaded(&self, entry: CacheEntry) {
        self.write().insert(entry.key.clone(), entry);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for FeedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedCache")
            .field("entries", &self.len())
            .field("now", &self.now)
            .finish()
    }
}

/// Read-only access to the cache.
#[derive(Clone, Copy)]
pub struct CacheView<'a> {
    cache: &'a FeedCache,
}

impl CacheView<'_> {
    pub fn is_new(&self, key: &str) -> bool {
        self.cache.is_new(key)
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.cache.get(key)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.cache.now()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED: &str = "https://example.com/feed.xml";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn feed(days: u32) -> FeedDescriptor {
        let mut feed = FeedDescriptor::parse(FEED).unwrap();
        feed.set_days_to_cache(days);
        feed
    }

    fn cache_at(now: DateTime<Utc>, days: u32) -> FeedCache {
        FeedCache::for_feeds(now, [&feed(days)])
    }

    #[test]
    fn test_unknown_key_is_new() {
        let cache = cache_at(t0(), 1);
        assert!(cache.is_new("k"));
    }

    #[test]
    fn test_seen_key_is_not_new() {
        let cache = cache_at(t0(), 1);
        cache.mark_seen("k", FEED, t0());
        assert!(!cache.is_new("k"));
        assert_eq!(cache.added_count(), 1);
    }

    #[test]
    fn test_retention_boundary_is_inclusive() {
        let exactly = t0() + Duration::days(1);
        let cache = cache_at(exactly, 1);
        cache.mark_seen("k", FEED, t0());
        assert!(!cache.is_new("k"), "still cached exactly at T+R");

        let after = exactly + Duration::seconds(1);
        let cache = cache_at(after, 1);
        cache.mark_seen("k", FEED, t0());
        assert!(cache.is_new("k"), "new again once T+R has passed");
    }

    #[test]
    fn test_zero_retention_never_dedups() {
        let cache = cache_at(t0(), 0);
        cache.mark_seen("k", FEED, t0());
        assert!(cache.is_new("k"));
        assert_eq!(cache.prune(t0()), 1);
    }

    #[test]
    fn test_unconfigured_feed_entries_expire() {
        let cache = cache_at(t0(), 5);
        cache.mark_seen("k", "https://gone.example.com/rss", t0());
        assert!(cache.is_new("k"));
        assert_eq!(cache.prune(t0()), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_mark_seen_refreshes_without_duplicating() {
        let cache = cache_at(t0(), 1);
        cache.mark_seen("k", FEED, t0());
        let later = t0() + Duration::hours(5);
        cache.mark_seen("k", FEED, later);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.added_count(), 1);
        assert_eq!(cache.get("k").unwrap().last_seen, later);
    }

    #[test]
    fn test_prune_removes_only_expired() {
        let now = t0() + Duration::days(2);
        let cache = cache_at(now, 1);
        cache.mark_seen("old", FEED, t0());
        cache.mark_seen("fresh", FEED, now - Duration::hours(1));

        assert_eq!(cache.prune(now), 1);
        assert!(cache.contains("fresh"));
        assert!(!cache.contains("old"));
        assert_eq!(cache.expired_count(), 1);
    }

    #[test]
    fn test_view_is_read_only_lookup() {
        let cache = cache_at(t0(), 1);
        cache.mark_seen("k", FEED, t0());
        let view = cache.view();
        assert!(!view.is_new("k"));
        assert_eq!(view.len(), 1);
        assert_eq!(view.now(), t0());
        assert_eq!(view.get("k").unwrap().feed, FEED);
    }

    #[test]
    fn test_concurrent_writers_are_serialized() {
        let cache = std::sync::Arc::new(cache_at(t0(), 1));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.mark_seen(&format!("{worker}-{i}"), FEED, t0());
                        cache.mark_seen("shared", FEED, t0());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 801);
        assert_eq!(cache.added_count(), 801);
    }
}
