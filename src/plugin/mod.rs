//! Extension hooks.
//!
//! A [`Plugin`] declares which [`Hook`]s it implements and overrides the
//! matching `on_*` methods. The [`PluginPipeline`] keeps every loaded plugin
//! in sort-key order and dispatches each hook to the plugins that declared
//! it.
//!
//! Gating hooks return `true` to continue and `false` to skip; the first
//! skip stops the dispatch and is handed back to the caller. Observation
//! hooks run every plugin and may mutate what they are given.

pub mod builtin;
mod pipeline;

use std::fmt;

use anyhow::{anyhow, bail};

pub use pipeline::{PipelineState, PluginPipeline};

use crate::cache::{CacheView, FeedCache};
use crate::config::{Config, Settings};
use crate::domain::{Channel, FeedDescriptor};
use crate::output::ReadOnlySink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Startup,
    PostConfig,
    CacheLoaded,
    FeedConfigItem,
    PostParse,
    PostProcess,
    PreCacheSave,
    PreFeedOutput,
    PostFeedOutput,
    PostSinkFlush,
    PostOutput,
    Shutdown,
}

impl Hook {
    pub const ALL: [Hook; 12] = [
        Hook::Startup,
        Hook::PostConfig,
        Hook::CacheLoaded,
        Hook::FeedConfigItem,
        Hook::PostParse,
        Hook::PostProcess,
        Hook::PreCacheSave,
        Hook::PreFeedOutput,
        Hook::PostFeedOutput,
        Hook::PostSinkFlush,
        Hook::PostOutput,
        Hook::Shutdown,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Hook::Startup => "on-startup",
            Hook::PostConfig => "on-post-config",
            Hook::CacheLoaded => "on-cache-loaded",
            Hook::FeedConfigItem => "on-feed-config-item",
            Hook::PostParse => "on-post-parse",
            Hook::PostProcess => "on-post-process",
            Hook::PreCacheSave => "on-pre-cache-save",
            Hook::PreFeedOutput => "on-pre-feed-output",
            Hook::PostFeedOutput => "on-post-feed-output",
            Hook::PostSinkFlush => "on-post-sink-flush",
            Hook::PostOutput => "on-post-output",
            Hook::Shutdown => "on-shutdown",
        }
    }

    /// Whether the hook's verdict can stop further processing.
    pub fn is_gating(&self) -> bool {
        matches!(
            self,
            Hook::FeedConfigItem
                | Hook::PostParse
                | Hook::PostProcess
                | Hook::PreFeedOutput
                | Hook::PostSinkFlush
        )
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One per-feed configuration parameter the loader does not handle itself.
#[derive(Debug, Clone, Copy)]
pub struct FeedConfigItem<'a> {
    pub section: &'a str,
    pub name: &'a str,
    pub value: &'a toml::Value,
}

impl FeedConfigItem<'_> {
    pub fn as_bool(&self) -> anyhow::Result<bool> {
        match self.value {
            toml::Value::Boolean(b) => Ok(*b),
            toml::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => bail!("[{}] {}: expected a boolean, got \"{}\"", self.section, self.name, s),
            },
            other => Err(anyhow!(
                "[{}] {}: expected a boolean, got {}",
                self.section,
                self.name,
                other.type_str()
            )),
        }
    }

    /// A string or an array of strings.
    pub fn as_strings(&self) -> anyhow::Result<Vec<String>> {
        match self.value {
            toml::Value::String(s) => Ok(vec![s.clone()]),
            toml::Value::Array(values) => values
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        anyhow!("[{}] {}: expected strings", self.section, self.name)
                    })
                })
                .collect(),
            other => Err(anyhow!(
                "[{}] {}: expected a string, got {}",
                self.section,
                self.name,
                other.type_str()
            )),
        }
    }
}

/// An extension invoked at the pipeline's transition points.
///
/// Only the hooks listed by [`Plugin::hooks`] are ever called.
#[allow(unused_variables)]
pub trait Plugin: Send {
    /// Display name used in logs and errors.
    fn name(&self) -> &str;

    /// Key fixing the invocation order among plugins.
    fn sort_key(&self) -> String {
        self.name().to_string()
    }

    fn hooks(&self) -> &[Hook];

    fn implements(&self, hook: Hook) -> bool {
        self.hooks().contains(&hook)
    }

    fn on_startup(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_post_config(&mut self, config: &mut Config) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_cache_loaded(&mut self, cache: &FeedCache) -> anyhow::Result<()> {
        Ok(())
    }

    /// Return `false` to drop the feed from the configuration.
    fn on_feed_config_item(
        &mut self,
        item: &FeedConfigItem<'_>,
        settings: &Settings,
        feed: &mut FeedDescriptor,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Return `false` to skip the feed.
    fn on_post_parse(
        &mut self,
        feed: &FeedDescriptor,
        channel: &mut Channel,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Runs after cache filtering. Return `false` to skip the feed.
    fn on_post_process(
        &mut self,
        feed: &FeedDescriptor,
        cache: Option<CacheView<'_>>,
        channel: &mut Channel,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn on_pre_cache_save(&mut self, cache: &FeedCache) -> anyhow::Result<()> {
        Ok(())
    }

    /// `channel` is the sink's private copy. Return `false` to keep this
    /// feed away from this sink.
    fn on_pre_feed_output(
        &mut self,
        feed: &FeedDescriptor,
        channel: &mut Channel,
        sink: &ReadOnlySink<'_>,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn on_post_feed_output(
        &mut self,
        feed: &FeedDescriptor,
        sink: &ReadOnlySink<'_>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Return `false` to disable the sink and discard its output.
    fn on_post_sink_flush(&mut self, sink: &ReadOnlySink<'_>) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn on_post_output(&mut self, sinks: &[ReadOnlySink<'_>]) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
