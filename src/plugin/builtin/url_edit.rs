use std::collections::HashMap;

use anyhow::{anyhow, bail, Context};
use regex::{Regex, RegexBuilder};
use url::Url;

use crate::config::Settings;
use crate::domain::{Channel, FeedDescriptor};
use crate::plugin::{FeedConfigItem, Hook, Plugin};

const PRUNE_URLS: &str = "prune_urls";
const EDIT_ITEM_URL: &str = "edit_item_url";
const EDIT_FEED_URL: &str = "edit_feed_url";

/// A parsed `s/pattern/replacement/flags` command.
#[derive(Debug, Clone)]
pub struct Substitution {
    pattern: Regex,
    replacement: String,
    global: bool,
}

impl Substitution {
    /// Parse a sed-style substitution. The delimiter is the character
    /// after `s`; flags are `g` (every match) and `i` (ignore case).
    pub fn parse(command: &str) -> anyhow::Result<Self> {
        let mut chars = command.trim().chars();
        if chars.next() != Some('s') {
            bail!("substitution \"{}\" must start with 's'", command);
        }
        let delim = chars
            .next()
            .ok_or_else(|| anyhow!("substitution \"{}\" has no delimiter", command))?;

        let parts = split_unescaped(chars.as_str(), delim);
        let [pattern, replacement, flags] = parts.as_slice() else {
            bail!("substitution \"{}\" needs three {}-separated parts", command, delim);
        };

        let mut global = false;
        let mut ignore_case = false;
        for flag in flags.chars() {
            match flag {
                'g' => global = true,
                'i' => ignore_case = true,
                other => bail!("substitution \"{}\": unknown flag '{}'", command, other),
            }
        }

        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(ignore_case)
            .build()
            .with_context(|| format!("bad pattern in \"{}\"", command))?;

        Ok(Self {
            pattern,
            replacement: perl_to_regex_replacement(replacement),
            global,
        })
    }

    pub fn apply(&self, input: &str) -> String {
        if self.global {
            self.pattern
                .replace_all(input, self.replacement.as_str())
                .into_owned()
        } else {
            self.pattern
                .replace(input, self.replacement.as_str())
                .into_owned()
        }
    }
}

/// Split on `delim`, treating `\<delim>` as a literal delimiter.
fn split_unescaped(input: &str, delim: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&delim) {
            current.push(delim);
            chars.next();
        } else if c == delim {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

/// `$1`/`\1` group references both become `${1}`.
fn perl_to_regex_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek().copied()) {
            ('\\' | '$', Some(d)) if d.is_ascii_digit() => {
                chars.next();
                out.push_str(&format!("${{{}}}", d));
            }
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Default)]
struct FeedEdits {
    prune: bool,
    item_edits: Vec<Substitution>,
    feed_edits: Vec<Substitution>,
}

impl FeedEdits {
    fn edit(&self, link: &str, edits: &[Substitution]) -> anyhow::Result<String> {
        let mut edited = link.to_string();
        if self.prune {
            if let Some(pos) = edited.find('?') {
                edited.truncate(pos);
            }
        }
        for edit in edits {
            edited = edit.apply(&edited);
        }
        Url::parse(&edited)
            .with_context(|| format!("editing \"{}\" produced illegal URL \"{}\"", link, edited))?;
        Ok(edited)
    }
}

/// Rewrites channel and item links right after parsing.
///
/// Per-feed parameters: `prune_urls` strips query strings; `edit_item_url`
/// and `edit_feed_url` take one or more `s/regex/replacement/flags`
/// commands.
#[derive(Default)]
pub struct UrlEditor {
    per_feed: HashMap<String, FeedEdits>,
}

impl UrlEditor {
    pub fn new() -> Self {
        Self::default()
    }

    fn edits_for(&mut self, feed: &FeedDescriptor) -> &mut FeedEdits {
        self.per_feed.entry(feed.url().to_string()).or_default()
    }
}

impl Plugin for UrlEditor {
    fn name(&self) -> &str {
        "Edit Parsed Feed URL"
    }

    fn sort_key(&self) -> String {
        "UrlEditor".into()
    }

    fn hooks(&self) -> &[Hook] {
        &[Hook::FeedConfigItem, Hook::PostParse]
    }

    fn on_feed_config_item(
        &mut self,
        item: &FeedConfigItem<'_>,
        _settings: &Settings,
        feed: &mut FeedDescriptor,
    ) -> anyhow::Result<bool> {
        match item.name {
            PRUNE_URLS => {
                let prune = item.as_bool()?;
                self.edits_for(feed).prune = prune;
            }
            EDIT_ITEM_URL | EDIT_FEED_URL => {
                let commands = item
                    .as_strings()?
                    .iter()
                    .map(|c| Substitution::parse(c))
                    .collect::<anyhow::Result<Vec<_>>>()
                    .with_context(|| format!("[{}] {}", item.section, item.name))?;
                let edits = self.edits_for(feed);
                if item.name == EDIT_ITEM_URL {
                    edits.item_edits.extend(commands);
                } else {
                    edits.feed_edits.extend(commands);
                }
            }
            _ => return Ok(true),
        }
        tracing::debug!("[{}]: configured {}", item.section, item.name);
        Ok(true)
    }

    fn on_post_parse(
        &mut self,
        feed: &FeedDescriptor,
        channel: &mut Channel,
    ) -> anyhow::Result<bool> {
        let Some(edits) = self.per_feed.get(feed.url().as_str()) else {
            return Ok(true);
        };

        if edits.prune || !edits.feed_edits.is_empty() {
            if let Some(link) = channel.link.take() {
                channel.link = Some(edits.edit(&link, &edits.feed_edits)?);
            }
        }

        if edits.prune || !edits.item_edits.is_empty() {
            for item in channel.items_mut() {
                if let Some(link) = item.link.take() {
                    item.link = Some(edits.edit(&link, &edits.item_edits)?);
                }
            }
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

    fn configure(plugin: &mut UrlEditor, feed: &mut FeedDescriptor, name: &str, value: toml::Value) {
        let item = FeedConfigItem {
            section: "example",
            name,
            value: &value,
        };
        assert!(plugin
            .on_feed_config_item(&item, &Settings::default(), feed)
            .unwrap());
    }

    fn channel(links: &[&str]) -> Channel {
        let items = links
            .iter()
            .map(|link| {
                let mut item = Item::new("https://example.com/feed.xml");
                item.link = Some(link.to_string());
                item
            })
            .collect();
        let mut channel = Channel::new("RSS 2.0").with_items(items);
        channel.link = Some("https://example.com/?ref=rss".into());
        channel
    }

    #[test]
    fn test_substitution_parse_and_apply() {
        let sub = Substitution::parse("s/http:/https:/").unwrap();
        assert_eq!(sub.apply("http://a/http:"), "https://a/http:");

        let sub = Substitution::parse("s|A|b|gi").unwrap();
        assert_eq!(sub.apply("aAa"), "bbb");

        let sub = Substitution::parse(r"s/(\w+)\.example/$1.test/").unwrap();
        assert_eq!(sub.apply("www.example"), "www.test");
    }

    #[test]
    fn test_escaped_delimiter() {
        let sub = Substitution::parse(r"s/a\/b/c/").unwrap();
        assert_eq!(sub.apply("a/b"), "c");
    }

    #[test]
    fn test_malformed_substitutions() {
        assert!(Substitution::parse("x/a/b/").is_err());
        assert!(Substitution::parse("s/a/b").is_err());
        assert!(Substitution::parse("s/(/b/").is_err());
        assert!(Substitution::parse("s/a/b/q").is_err());
    }

    #[test]
    fn test_prune_strips_query_strings() {
        let mut plugin = UrlEditor::new();
        let mut feed = feed();
        configure(&mut plugin, &mut feed, PRUNE_URLS, toml::Value::Boolean(true));

        let mut channel = channel(&["https://example.com/a?utm_source=rss"]);
        assert!(plugin.on_post_parse(&feed, &mut channel).unwrap());
        assert_eq!(channel.link.as_deref(), Some("https://example.com/"));
        assert_eq!(
            channel.items()[0].link.as_deref(),
            Some("https://example.com/a")
        );
    }

    #[test]
    fn test_item_edits_leave_channel_link_alone() {
        let mut plugin = UrlEditor::new();
        let mut feed = feed();
        configure(
            &mut plugin,
            &mut feed,
            EDIT_ITEM_URL,
            toml::Value::Array(vec!["s/example.com/example.org/".into()]),
        );

        let mut channel = channel(&["https://example.com/a"]);
        plugin.on_post_parse(&feed, &mut channel).unwrap();
        assert_eq!(channel.link.as_deref(), Some("https://example.com/?ref=rss"));
        assert_eq!(
            channel.items()[0].link.as_deref(),
            Some("https://example.org/a")
        );
    }

    #[test]
    fn test_illegal_result_is_an_error() {
        let mut plugin = UrlEditor::new();
        let mut feed = feed();
        configure(
            &mut plugin,
            &mut feed,
            EDIT_ITEM_URL,
            toml::Value::String("s/https:\\/\\///".into()),
        );

        let mut channel = channel(&["https://example.com/a"]);
        assert!(plugin.on_post_parse(&feed, &mut channel).is_err());
    }

    #[test]
    fn test_other_feeds_untouched() {
        let mut plugin = UrlEditor::new();
        let mut feed = feed();
        configure(&mut plugin, &mut feed, PRUNE_URLS, toml::Value::Boolean(true));

        let other = FeedDescriptor::parse("https://other.example.com/rss").unwrap();
        let mut channel = channel(&["https://example.com/a?x=1"]);
        plugin.on_post_parse(&other, &mut channel).unwrap();
        assert_eq!(
            channel.items()[0].link.as_deref(),
            Some("https://example.com/a?x=1")
        );
    }
}
