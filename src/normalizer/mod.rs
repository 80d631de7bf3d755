pub mod encoding;

use chrono::Utc;
use feed_rs::model::FeedType;
use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::{FreshetError, Result};
use crate::domain::{Channel, Item};

pub use encoding::Encoding;

/// Turns raw feed bytes into a [`Channel`].
///
/// Parsers may keep state between calls, so each acquisition worker gets
/// its own instance from a [`ParserFactory`].
pub trait FeedParser: Send {
    fn parse(&mut self, feed_url: &str, raw: &[u8], encoding: Option<Encoding>) -> Result<Channel>;
}

pub trait ParserFactory: Send + Sync {
    fn create(&self) -> Box<dyn FeedParser>;
}

/// Parser for RSS 0.9x, RSS 1.0, RSS 2.0, Atom and JSON Feed, backed by
/// feed-rs.
#[derive(Debug, Default)]
pub struct Normalizer {
    parsed: usize,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds parsed by this instance.
    pub fn parsed(&self) -> usize {
        self.parsed
    }

    pub fn normalize(&mut self, feed_url: &str, body: &[u8]) -> Result<Channel> {
        // An empty generated ID leaves `source_id` unset, so items without
        // one are keyed by their link.
        let feed = parser::Builder::new()
            .id_generator(|_links, _title, _uri| String::new())
            .build()
            .parse(body)
            .map_err(|e| FreshetError::FeedParse(e.to_string()))?;
        self.parsed += 1;

        let mut channel = Channel::new(format_label(&feed.feed_type));
        channel.title = feed.title.map(|t| decode_html_entities(&t.content).to_string());
        channel.link = feed.links.first().map(|l| l.href.clone());
        channel.published_at = feed
            .published
            .or(feed.updated)
            .map(|dt| dt.with_timezone(&Utc));

        let items = feed
            .entries
            .into_iter()
            .map(|entry| {
                let mut item = Item::new(feed_url);
                item.source_id = Some(entry.id).filter(|id| !id.is_empty());
                item.title = entry
                    .title
                    .map(|t| decode_html_entities(&t.content).to_string());
                item.link = entry.links.first().map(|l| l.href.clone());
                item.authors = entry.authors.into_iter().map(|a| a.name).collect();
                item.published_at = entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc));
                item.summary = entry
                    .summary
                    .map(|s| decode_html_entities(&s.content).to_string());
                if let Some(content) = entry.content {
                    if let Some(body) = content.body {
                        item.contents
                            .insert(content.content_type.essence().to_string(), body);
                    }
                }
                item
            })
            .collect();

        Ok(channel.with_items(items))
    }
}

impl FeedParser for Normalizer {
    fn parse(&mut self, feed_url: &str, raw: &[u8], encoding: Option<Encoding>) -> Result<Channel> {
        match encoding {
            None => self.normalize(feed_url, raw),
            Some(Encoding::Utf8) if std::str::from_utf8(raw).is_ok() => {
                self.normalize(feed_url, raw)
            }
            Some(target) => {
                let utf8 = encoding::transcode(raw, target);
                self.normalize(feed_url, &utf8)
            }
        }
    }
}

/// Hands out a fresh [`Normalizer`] per worker.
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizerFactory;

impl ParserFactory for NormalizerFactory {
    fn create(&self) -> Box<dyn FeedParser> {
        Box::new(Normalizer::new())
    }
}

fn format_label(feed_type: &FeedType) -> &'static str {
    match feed_type {
        FeedType::Atom => "Atom",
        FeedType::JSON => "JSON Feed",
        FeedType::RSS0 => "RSS 0.9x",
        FeedType::RSS1 => "RSS 1.0",
        FeedType::RSS2 => "RSS 2.0",
    }
}
