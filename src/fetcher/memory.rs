use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::app::{FreshetError, Result};
use crate::domain::normalize_link;
use crate::fetcher::{FetchedFeed, Fetcher};

enum Canned {
    Feed(FetchedFeed),
    Failure(String),
}

/// Serves canned feed bodies, optionally after a per-URL delay.
///
/// URLs are matched after normalization, so `HTTP://Example.com/a#x` and
/// `http://example.com/a` hit the same entry.
#[derive(Default)]
pub struct MemoryFetcher {
    responses: HashMap<String, Canned>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.responses
            .insert(normalize_link(url), Canned::Feed(FetchedFeed::new(body)));
        self
    }

    pub fn with_fetched(mut self, url: &str, feed: FetchedFeed) -> Self {
        self.responses.insert(normalize_link(url), Canned::Feed(feed));
        self
    }

    pub fn with_failure(mut self, url: &str, message: &str) -> Self {
        self.responses
            .insert(normalize_link(url), Canned::Failure(message.to_string()));
        self
    }

    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(normalize_link(url), delay);
        self
    }

    /// URLs requested so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed> {
        let key = normalize_link(url);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.clone());

        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }

        match self.responses.get(&key) {
            Some(Canned::Feed(feed)) => Ok(feed.clone()),
            Some(Canned::Failure(message)) => Err(FreshetError::Fetch {
                url: url.to_string(),
                message: message.clone(),
            }),
            None => Err(FreshetError::Fetch {
                url: url.to_string(),
                message: "404 Not Found".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_canned_bodies() {
        let fetcher = MemoryFetcher::new()
            .with_feed("https://Example.com/a#top", "body-a")
            .with_failure("https://example.com/b", "connection reset");

        let fetched = fetcher.fetch("https://example.com/a").await.unwrap();
        assert_eq!(fetched.body, b"body-a");

        let err = fetcher.fetch("https://example.com/b").await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));

        assert!(fetcher.fetch("https://example.com/c").await.is_err());
        assert_eq!(fetcher.requests().len(), 3);
    }

    #[test]
    fn test_delay_still_serves_body() {
        let fetcher = MemoryFetcher::new()
            .with_feed("https://example.com/slow", "slow")
            .with_delay("https://example.com/slow", Duration::from_millis(10));

        let fetched = tokio_test::block_on(fetcher.fetch("https://example.com/slow"));
        let fetched = tokio_test::assert_ok!(fetched);
        assert_eq!(fetched.body, b"slow");
    }
}
