use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::domain::feed::normalize_link;

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub feed_url: String,
    /// Stable per-item identifier, when the feed format provides one.
    pub source_id: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub authors: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    /// Content bodies keyed by MIME type, e.g. `text/html`.
    pub contents: BTreeMap<String, String>,
}

impl Item {
    pub fn new(feed_url: &str) -> Self {
        Self {
            feed_url: feed_url.to_string(),
            source_id: None,
            title: None,
            link: None,
            authors: Vec::new(),
            published_at: None,
            summary: None,
            contents: BTreeMap::new(),
        }
    }

    /// Key identifying this item in the feed cache.
    ///
    /// Source IDs are hashed together with the feed URL so identical IDs in
    /// different feeds never collide. Without an ID the normalized link is
    /// the key. The key is derived on every call, so link edits made after
    /// parsing are honored.
    pub fn cache_key(&self) -> String {
        if let Some(id) = self.source_id.as_deref().filter(|id| !id.is_empty()) {
            return Self::generate_id(&self.feed_url, id);
        }
        if let Some(link) = self.link.as_deref().filter(|l| !l.trim().is_empty()) {
            return normalize_link(link);
        }
        Self::generate_id(&self.feed_url, self.title.as_deref().unwrap_or(""))
    }

    /// Generate a deterministic ID from feed URL and entry ID
    pub fn generate_id(feed_url: &str, entry_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(feed_url.as_bytes());
        hasher.update(entry_id.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(No Title)")
    }

    pub fn first_author(&self) -> Option<&str> {
        self.authors.first().map(String::as_str)
    }

    /// First content body whose type matches one of `types`, in order.
    pub fn first_content_of_type(&self, types: &[&str]) -> Option<&str> {
        types
            .iter()
            .find_map(|t| self.contents.get(*t))
            .map(String::as_str)
    }
}
