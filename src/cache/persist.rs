//! On-disk form of the cache: one JSON object per line.
//!
//! Saving rotates up to `max_backups` earlier generations
//! (`<file>.1` is the newest, `<file>.N` the oldest) before the new
//! snapshot replaces the current file.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::app::{FreshetError, Result};
use crate::cache::{CacheEntry, FeedCache};
use crate::domain::FeedDescriptor;

impl FeedCache {
    /// Load the cache file at `path` and prune it at `now`.
    ///
    /// A missing or unreadable file yields an empty cache: the run then
    /// reports everything instead of failing.
    pub fn load<'a, I>(path: &Path, now: DateTime<Utc>, feeds: I) -> Self
    where
        I: IntoIterator<Item = &'a FeedDescriptor>,
    {
        let cache = Self::for_feeds(now, feeds);

        match read_entries(path) {
            Ok(Some(entries)) => {
                let total = entries.len();
                for entry in entries {
                    cache.insert_loaded(entry);
                }
                let pruned = cache.prune(now);
                tracing::info!(
                    "Loaded {} cache entries from {} ({} expired)",
                    total,
                    path.display(),
                    pruned
                );
            }
            Ok(None) => {
                tracing::info!("No cache file at {}, starting empty", path.display());
            }
            Err(e) => {
                tracing::warn!("Ignoring unusable cache file: {}", e);
            }
        }

        cache
    }

    /// Write the cache to `path`, keeping up to `max_backups` older copies.
    ///
    /// In-memory state is left untouched when this fails.
    pub fn save(&self, path: &Path, max_backups: usize) -> Result<()> {
        let io_err = |source| FreshetError::CacheIo {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = sibling(path, "tmp");
        {
            let file = fs::File::create(&tmp).map_err(io_err)?;
            let mut out = BufWriter::new(file);
            for entry in self.entries() {
                let line = serde_json::to_string(&entry)
                    .map_err(|e| io_err(std::io::Error::other(e)))?;
                writeln!(out, "{}", line).map_err(io_err)?;
            }
            out.flush().map_err(io_err)?;
        }

        rotate_backups(path, max_backups).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;

        tracing::info!(
            "Saved {} cache entries to {}",
            self.len(),
            path.display()
        );
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<Option<Vec<CacheEntry>>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(FreshetError::CacheIo {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut entries = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| FreshetError::CacheIo {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: CacheEntry = serde_json::from_str(&line).map_err(|e| {
            FreshetError::CacheIo {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("line {}: {}", lineno + 1, e),
                ),
            }
        })?;
        entries.push(entry);
    }
    Ok(Some(entries))
}

fn rotate_backups(path: &Path, max_backups: usize) -> std::io::Result<()> {
    if max_backups == 0 || !path.exists() {
        return Ok(());
    }

    let oldest = sibling(path, &max_backups.to_string());
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for generation in (1..max_backups).rev() {
        let from = sibling(path, &generation.to_string());
        if from.exists() {
            fs::rename(&from, sibling(path, &(generation + 1).to_string()))?;
        }
    }
    fs::rename(path, sibling(path, "1"))
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const FEED: &str = "https://example.com/feed.xml";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn feed() -> FeedDescriptor {
        let mut feed = FeedDescriptor::parse(FEED).unwrap();
        feed.set_days_to_cache(7);
        feed
    }

    #[test]
    fn test_missing_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeedCache::load(&dir.path().join("absent.jsonl"), now(), [&feed()]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.jsonl");
        fs::write(&path, "{\"key\": \"a\"\nnot json at all\n").unwrap();

        let cache = FeedCache::load(&path, now(), [&feed()]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_save_then_load_keeps_live_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.jsonl");
        let feed = feed();

        let cache = FeedCache::for_feeds(now(), [&feed]);
        cache.mark_seen("fresh", FEED, now());
        cache.mark_seen("stale", FEED, now() - Duration::days(30));
        cache.save(&path, 0).unwrap();

        let loaded = FeedCache::load(&path, now(), [&feed]);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("fresh").unwrap().last_seen, now());
        assert_eq!(loaded.expired_count(), 1);
        assert_eq!(loaded.added_count(), 0);
    }

    #[test]
    fn test_save_rotates_backups_and_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.jsonl");
        let feed = feed();

        for generation in 0..4 {
            let cache = FeedCache::for_feeds(now(), [&feed]);
            cache.mark_seen(&format!("gen-{generation}"), FEED, now());
            cache.save(&path, 2).unwrap();
        }

        let current = fs::read_to_string(&path).unwrap();
        let first = fs::read_to_string(sibling(&path, "1")).unwrap();
        let second = fs::read_to_string(sibling(&path, "2")).unwrap();
        assert!(current.contains("gen-3"));
        assert!(first.contains("gen-2"));
        assert!(second.contains("gen-1"));
        assert!(!sibling(&path, "3").exists());
        assert!(!sibling(&path, "tmp").exists());
    }

    #[test]
    fn test_save_without_backups_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.jsonl");
        let cache = FeedCache::for_feeds(now(), [&feed()]);
        cache.mark_seen("a", FEED, now());
        cache.save(&path, 0).unwrap();
        cache.save(&path, 0).unwrap();

        assert!(!sibling(&path, "1").exists());
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_save_failure_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let path = blocker.join("cache.jsonl");

        let cache = FeedCache::for_feeds(now(), [&feed()]);
        cache.mark_seen("a", FEED, now());
        let err = cache.save(&path, 1).unwrap_err();

        assert!(matches!(err, FreshetError::CacheIo { .. }));
        assert_eq!(cache.len(), 1);
    }
}
