//! Concurrent acquisition.
//!
//! A fixed pool of worker tasks drains a shared queue of feeds. Each worker
//! owns a parser and runs fetch, parse, `on-post-parse`, cache filtering and
//! `on-post-process` for one feed at a time. Workers start together once the
//! whole pool exists, and the caller resumes only after every worker has
//! finished. Results come back in configuration order no matter which feed
//! finished first.

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::Barrier;

use crate::app::{FreshetError, Result};
use crate::cache::FeedCache;
use crate::domain::{Channel, FeedDescriptor};
use crate::fetcher::Fetcher;
use crate::normalizer::{encoding, FeedParser, ParserFactory};
use crate::plugin::{Hook, PluginPipeline};

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Surviving channels in configuration order.
pub type ChannelSet = Vec<(Arc<FeedDescriptor>, Channel)>;

type Queue = Arc<Mutex<VecDeque<(usize, Arc<FeedDescriptor>)>>>;
type Collector = Arc<Mutex<HashMap<usize, Channel>>>;

#[derive(Clone)]
pub struct ParallelFetcher {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    parsers: Arc<dyn ParserFactory>,
    workers: usize,
    fetch_timeout: Duration,
}

impl ParallelFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>, parsers: Arc<dyn ParserFactory>) -> Self {
        Self::with_workers(fetcher, parsers, DEFAULT_WORKERS)
    }

    pub fn with_workers(
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        parsers: Arc<dyn ParserFactory>,
        workers: usize,
    ) -> Self {
        Self {
            fetcher,
            parsers,
            workers: workers.max(1),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fetch and filter every enabled feed.
    ///
    /// Only feeds that still have items after filtering are returned. When
    /// `cache` is `None` nothing is deduplicated.
    pub async fn fetch_all(
        &self,
        feeds: &[Arc<FeedDescriptor>],
        cache: Option<Arc<FeedCache>>,
        pipeline: Arc<PluginPipeline>,
    ) -> Result<ChannelSet> {
        let queue: VecDeque<_> = feeds
            .iter()
            .enumerate()
            .filter(|(_, feed)| {
                if !feed.enabled {
                    tracing::debug!("Skipping disabled feed {}", feed.url());
                }
                feed.enabled
            })
            .map(|(index, feed)| (index, Arc::clone(feed)))
            .collect();
        if queue.is_empty() {
            return Err(FreshetError::AllFeedsDisabled);
        }

        let workers = self.workers.min(queue.len());
        tracing::info!("Fetching {} feeds with {} workers", queue.len(), workers);

        let queue: Queue = Arc::new(Mutex::new(queue));
        let collector: Collector = Arc::new(Mutex::new(HashMap::new()));
        let start = Arc::new(Barrier::new(workers + 1));

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let mut worker = Worker {
                id,
                queue: Arc::clone(&queue),
                collector: Arc::clone(&collector),
                fetcher: Arc::clone(&self.fetcher),
                parser: self.parsers.create(),
                cache: cache.clone(),
                pipeline: Arc::clone(&pipeline),
                fetch_timeout: self.fetch_timeout,
            };
            let start = Arc::clone(&start);
            handles.push(tokio::spawn(async move {
                start.wait().await;
                worker.run().await
            }));
        }

        start.wait().await;
        for (id, joined) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = joined {
                tracing::error!("Acquisition worker {} failed to join: {}", id, e);
            }
        }

        let mut survivors: Vec<_> = lock(&collector).drain().collect();
        survivors.sort_by_key(|(index, _)| *index);
        Ok(survivors
            .into_iter()
            .map(|(index, channel)| (Arc::clone(&feeds[index]), channel))
            .collect())
    }
}

struct Worker {
    id: usize,
    queue: Queue,
    collector: Collector,
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    parser: Box<dyn FeedParser>,
    cache: Option<Arc<FeedCache>>,
    pipeline: Arc<PluginPipeline>,
    fetch_timeout: Duration,
}

impl Worker {
    async fn run(&mut self) {
        while let Some((index, feed)) = self.next() {
            let url = feed.url().as_str();
            match AssertUnwindSafe(self.process(&feed)).catch_unwind().await {
                Ok(Ok(Some(channel))) => {
                    tracing::info!("Feed {}: {} items to report", url, channel.len());
                    lock(&self.collector).insert(index, channel);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => tracing::warn!("Feed {}: {}", url, e),
                Err(_) => tracing::error!("Worker {} panicked while processing {}", self.id, url),
            }
        }
        tracing::debug!("Worker {} finished", self.id);
    }

    fn next(&self) -> Option<(usize, Arc<FeedDescriptor>)> {
        lock(&self.queue).pop_front()
    }

    /// Run one feed through the acquisition stages. `None` when the feed was
    /// vetoed or has nothing left to report.
    async fn process(&mut self, feed: &FeedDescriptor) -> Result<Option<Channel>> {
        let url = feed.url().as_str();

        let fetched = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(url))
            .await
            .map_err(|_| FreshetError::Timeout {
                url: url.to_string(),
                secs: self.fetch_timeout.as_secs(),
            })??;

        let encoding = encoding::effective(feed.force_encoding(), fetched.charset.as_deref())?;
        let mut channel = self.parser.parse(url, &fetched.body, encoding)?;
        tracing::debug!(
            "Worker {} parsed {} ({}, {} items)",
            self.id,
            url,
            channel.format,
            channel.len()
        );

        if !self.pipeline.post_parse(feed, &mut channel)? {
            tracing::debug!("Feed {} skipped by {}", url, Hook::PostParse);
            return Ok(None);
        }

        let mut seen = Vec::new();
        if let Some(cache) = self.cache.as_deref() {
            if feed.caches_items() {
                let before = channel.len();
                seen = drop_seen_items(cache, &mut channel);
                tracing::debug!("Feed {}: {} items already seen", url, before - channel.len());
            }
        }

        let view = self.cache.as_deref().map(FeedCache::view);
        let keep = self.pipeline.post_process(feed, view, &mut channel)?;

        // Marks land only once the feed got through every fallible stage.
        if let Some(cache) = self.cache.as_deref() {
            let now = cache.now();
            for key in &seen {
                cache.mark_seen(key, url, now);
            }
        }

        if !keep {
            tracing::debug!("Feed {} skipped by {}", url, Hook::PostProcess);
            return Ok(None);
        }

        if channel.is_empty() {
            return Ok(None);
        }
        Ok(Some(channel))
    }
}

/// Keep only unseen items, first occurrence winning within the feed.
///
/// Returns the key of every item in the feed, so the caller can mark them
/// all seen and items that stay in the feed keep their entry alive.
fn drop_seen_items(cache: &FeedCache, channel: &mut Channel) -> Vec<String> {
    let mut keys = Vec::with_capacity(channel.len());
    let mut in_feed = HashSet::new();

    let fresh = channel
        .snapshot_items()
        .into_iter()
        .filter(|item| {
            let key = item.cache_key();
            let first = in_feed.insert(key.clone());
            let new = first && cache.is_new(&key);
            if first {
                keys.push(key);
            }
            new
        })
        .collect();
    channel.set_items(fresh);

    keys
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
