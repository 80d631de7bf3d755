use std::hash::{Hash, Hasher};

use chrono::Duration;
use url::Url;

use crate::app::Result;

/// One configured feed.
///
/// Identity is the normalized URL: two descriptors are equal iff their
/// normalized URLs match, whatever their other settings.
#[derive(Debug, Clone)]
pub struct FeedDescriptor {
    url: Url,
    section: String,
    retention: Duration,
    force_encoding: Option<String>,
    pub summary_only: bool,
    pub enabled: bool,
}

impl FeedDescriptor {
    pub fn new(url: Url) -> Self {
        let url = normalize_url(url);
        Self {
            section: url.to_string(),
            url,
            retention: Duration::zero(),
            force_encoding: None,
            summary_only: false,
            enabled: true,
        }
    }

    pub fn parse(url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(url.trim())?))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Name of the configuration section the feed was declared in.
    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }

    /// How long items of this feed stay in the cache. Zero disables dedup.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn set_retention(&mut self, retention: Duration) {
        self.retention = retention.max(Duration::zero());
    }

    pub fn set_days_to_cache(&mut self, days: u32) {
        self.set_retention(Duration::days(i64::from(days)));
    }

    pub fn caches_items(&self) -> bool {
        self.retention > Duration::zero()
    }

    pub fn force_encoding(&self) -> Option<&str> {
        self.force_encoding.as_deref()
    }

    pub fn set_force_encoding(&mut self, encoding: Option<String>) {
        self.force_encoding = encoding.filter(|e| !e.trim().is_empty());
    }
}

impl PartialEq for FeedDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for FeedDescriptor {}

impl Hash for FeedDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// Normalize a URL for identity comparisons.
///
/// The `url` crate already lowercases scheme and host and drops default
/// ports; on top of that the fragment is removed.
pub fn normalize_url(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

/// Normalize a link string, returning it unchanged when it is not a URL.
pub fn normalize_link(link: &str) -> String {
    match Url::parse(link.trim()) {
        Ok(url) => normalize_url(url).to_string(),
        Err(_) => link.trim().to_string(),
    }
}
