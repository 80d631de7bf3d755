use std::collections::{HashMap, HashSet};

use crate::cache::CacheView;
use crate::config::Settings;
use crate::domain::{Channel, FeedDescriptor};
use crate::plugin::{FeedConfigItem, Hook, Plugin};

const PARAM: &str = "ignore_duplicate_titles";

/// Drops items whose title repeats an earlier item of the same feed.
///
/// Enabled per feed with `ignore_duplicate_titles = true`. Titles compare
/// case-insensitively with runs of whitespace collapsed; untitled items
/// compare by link.
#[derive(Default)]
pub struct IgnoreDuplicateTitles {
    per_feed: HashMap<String, bool>,
}

impl IgnoreDuplicateTitles {
    pub fn new() -> Self {
        Self::default()
    }

    fn title_key(title: Option<&str>, link: Option<&str>) -> String {
        match title {
            Some(title) => title
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
            None => link.unwrap_or_default().to_string(),
        }
    }
}

impl Plugin for IgnoreDuplicateTitles {
    fn name(&self) -> &str {
        "Ignore Duplicate Titles"
    }

    fn sort_key(&self) -> String {
        "IgnoreDuplicateTitles".into()
    }

    fn hooks(&self) -> &[Hook] {
        &[Hook::FeedConfigItem, Hook::PostProcess]
    }

    fn on_feed_config_item(
        &mut self,
        item: &FeedConfigItem<'_>,
        _settings: &Settings,
        feed: &mut FeedDescriptor,
    ) -> anyhow::Result<bool> {
        if item.name == PARAM {
            let flag = item.as_bool()?;
            tracing::debug!("[{}]: {}={}", item.section, PARAM, flag);
            self.per_feed.insert(feed.url().to_string(), flag);
        }
        Ok(true)
    }

    fn on_post_process(
        &mut self,
        feed: &FeedDescriptor,
        _cache: Option<CacheView<'_>>,
        channel: &mut Channel,
    ) -> anyhow::Result<bool> {
        if !self.per_feed.get(feed.url().as_str()).copied().unwrap_or(false) {
            return Ok(true);
        }

        let mut seen = HashSet::new();
        let before = channel.len();
        channel.retain_items(|item| {
            seen.insert(Self::title_key(item.title.as_deref(), item.link.as_deref()))
        });
        let dropped = before - channel.len();
        if dropped > 0 {
            tracing::debug!("Feed {}: ignored {} duplicate titles", feed.url(), dropped);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Item;

    fn feed() -> FeedDescriptor {
        FeedDescriptor::parse("https://example.com/feed.xml").unwrap()
    }

    fn item(title: Option<&str>, link: &str) -> Item {
        let mut item = Item::new("https://example.com/feed.xml");
        item.title = title.map(str::to_string);
        item.link = Some(link.into());
        item
    }

    fn enable(plugin: &mut IgnoreDuplicateTitles, feed: &mut FeedDescriptor) {
        let value = toml::Value::Boolean(true);
        let config_item = FeedConfigItem {
            section: "example",
            name: PARAM,
            value: &value,
        };
        assert!(plugin
            .on_feed_config_item(&config_item, &Settings::default(), feed)
            .unwrap());
    }

    #[test]
    fn test_duplicates_removed_when_enabled() {
        let mut plugin = IgnoreDuplicateTitles::new();
        let mut feed = feed();
        enable(&mut plugin, &mut feed);

        let mut channel = Channel::new("RSS 2.0").with_items(vec![
            item(Some("Hello  World"), "https://example.com/1"),
            item(Some("hello world"), "https://example.com/2"),
            item(None, "https://example.com/3"),
            item(None, "https://example.com/3"),
            item(Some("Other"), "https://example.com/4"),
        ]);

        assert!(plugin.on_post_process(&feed, None, &mut channel).unwrap());
        let links: Vec<_> = channel
            .items()
            .iter()
            .map(|i| i.link.clone().unwrap())
            .collect();
        assert_eq!(
            links,
            vec![
                "https://example.com/1",
                "https://example.com/3",
                "https://example.com/4"
            ]
        );
    }

    #[test]
    fn test_untouched_when_not_enabled() {
        let mut plugin = IgnoreDuplicateTitles::new();
        let mut channel = Channel::new("RSS 2.0").with_items(vec![
            item(Some("Same"), "https://example.com/1"),
            item(Some("Same"), "https://example.com/2"),
        ]);
        assert!(plugin.on_post_process(&feed(), None, &mut channel).unwrap());
        assert_eq!(channel.len(), 2);
    }

    #[test]
    fn test_bad_flag_is_an_error() {
        let mut plugin = IgnoreDuplicateTitles::new();
        let value = toml::Value::String("perhaps".into());
        let config_item = FeedConfigItem {
            section: "example",
            name: PARAM,
            value: &value,
        };
        assert!(plugin
            .on_feed_config_item(&config_item, &Settings::default(), &mut feed())
            .is_err());
    }
}
