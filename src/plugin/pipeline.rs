use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::app::{FreshetError, Result};
use crate::cache::{CacheView, FeedCache};
use crate::config::{Config, Settings};
use crate::domain::{Channel, FeedDescriptor};
use crate::output::ReadOnlySink;
use crate::plugin::{FeedConfigItem, Hook, Plugin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unloaded,
    Loaded,
    Active,
    Shutdown,
}

impl PipelineState {
    fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Unloaded => "unloaded",
            PipelineState::Loaded => "loaded",
            PipelineState::Active => "active",
            PipelineState::Shutdown => "shut down",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ordered set of loaded plugins.
///
/// Every plugin sits behind its own mutex so acquisition workers can run
/// hooks concurrently for different feeds while a single plugin only ever
/// sees one call at a time.
pub struct PluginPipeline {
    plugins: Vec<Mutex<Box<dyn Plugin>>>,
    state: Mutex<PipelineState>,
}

impl Default for PluginPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginPipeline {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            state: Mutex::new(PipelineState::Unloaded),
        }
    }

    /// Build a loaded pipeline in one step.
    pub fn with_plugins(plugins: Vec<Box<dyn Plugin>>) -> Result<Self> {
        let mut pipeline = Self::new();
        pipeline.load(plugins)?;
        Ok(pipeline)
    }

    /// Install the plugins, ordered by sort key. Ties keep load order.
    pub fn load(&mut self, mut plugins: Vec<Box<dyn Plugin>>) -> Result<()> {
        let state = self.state();
        if state != PipelineState::Unloaded {
            return Err(FreshetError::Other(format!(
                "plugins can only be loaded once (pipeline is {})",
                state
            )));
        }

        plugins.sort_by_cached_key(|p| p.sort_key());
        for plugin in &plugins {
            info!(
                "Loaded plugin \"{}\" (hooks: {})",
                plugin.name(),
                plugin
                    .hooks()
                    .iter()
                    .map(Hook::name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        self.plugins = plugins.into_iter().map(Mutex::new).collect();
        self.set_state(PipelineState::Loaded);
        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugin names in invocation order.
    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins
            .iter()
            .map(|slot| lock(slot).name().to_string())
            .collect()
    }

    /// Fire `on-startup` and start accepting hook calls.
    pub fn startup(&self) -> Result<()> {
        self.require(Hook::Startup, PipelineState::Loaded)?;
        self.observe_unchecked(Hook::Startup, |p| p.on_startup())?;
        self.set_state(PipelineState::Active);
        Ok(())
    }

    /// Fire `on-shutdown`. Every plugin is notified even if one fails; the
    /// first failure is returned. No hook runs afterwards.
    pub fn shutdown(&self) -> Result<()> {
        let state = self.state();
        if !matches!(state, PipelineState::Loaded | PipelineState::Active) {
            return Err(FreshetError::PipelineState {
                hook: Hook::Shutdown,
                state: state.as_str(),
            });
        }

        let mut first_error = None;
        for slot in &self.plugins {
            let mut plugin = lock(slot);
            if !plugin.implements(Hook::Shutdown) {
                continue;
            }
            if let Err(source) = plugin.on_shutdown() {
                let err = plugin_error(plugin.name(), Hook::Shutdown, source);
                tracing::warn!("{}", err);
                first_error.get_or_insert(err);
            }
        }
        self.set_state(PipelineState::Shutdown);
        first_error.map_or(Ok(()), Err)
    }

    pub fn post_config(&self, config: &mut Config) -> Result<()> {
        self.observe(Hook::PostConfig, |p| p.on_post_config(config))
    }

    pub fn cache_loaded(&self, cache: &FeedCache) -> Result<()> {
        self.observe(Hook::CacheLoaded, |p| p.on_cache_loaded(cache))
    }

    pub fn feed_config_item(
        &self,
        item: &FeedConfigItem<'_>,
        settings: &Settings,
        feed: &mut FeedDescriptor,
    ) -> Result<bool> {
        self.gate(Hook::FeedConfigItem, |p| {
            p.on_feed_config_item(item, settings, feed)
        })
    }

    pub fn post_parse(&self, feed: &FeedDescriptor, channel: &mut Channel) -> Result<bool> {
        self.gate(Hook::PostParse, |p| p.on_post_parse(feed, channel))
    }

    pub fn post_process(
        &self,
        feed: &FeedDescriptor,
        cache: Option<CacheView<'_>>,
        channel: &mut Channel,
    ) -> Result<bool> {
        self.gate(Hook::PostProcess, |p| p.on_post_process(feed, cache, channel))
    }

    pub fn pre_cache_save(&self, cache: &FeedCache) -> Result<()> {
        self.observe(Hook::PreCacheSave, |p| p.on_pre_cache_save(cache))
    }

    pub fn pre_feed_output(
        &self,
        feed: &FeedDescriptor,
        channel: &mut Channel,
        sink: &ReadOnlySink<'_>,
    ) -> Result<bool> {
        self.gate(Hook::PreFeedOutput, |p| {
            p.on_pre_feed_output(feed, channel, sink)
        })
    }

    pub fn post_feed_output(&self, feed: &FeedDescriptor, sink: &ReadOnlySink<'_>) -> Result<()> {
        self.observe(Hook::PostFeedOutput, |p| p.on_post_feed_output(feed, sink))
    }

    pub fn post_sink_flush(&self, sink: &ReadOnlySink<'_>) -> Result<bool> {
        self.gate(Hook::PostSinkFlush, |p| p.on_post_sink_flush(sink))
    }

    pub fn post_output(&self, sinks: &[ReadOnlySink<'_>]) -> Result<()> {
        self.observe(Hook::PostOutput, |p| p.on_post_output(sinks))
    }

    /// Run a gating hook; stops at the first plugin that says skip.
    fn gate<F>(&self, hook: Hook, mut call: F) -> Result<bool>
    where
        F: FnMut(&mut dyn Plugin) -> anyhow::Result<bool>,
    {
        self.require(hook, PipelineState::Active)?;
        for slot in &self.plugins {
            let mut plugin = lock(slot);
            if !plugin.implements(hook) {
                continue;
            }
            match call(&mut **plugin) {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Plugin \"{}\" returned skip from {}", plugin.name(), hook);
                    return Ok(false);
                }
                Err(source) => return Err(plugin_error(plugin.name(), hook, source)),
            }
        }
        Ok(true)
    }

    fn observe<F>(&self, hook: Hook, call: F) -> Result<()>
    where
        F: FnMut(&mut dyn Plugin) -> anyhow::Result<()>,
    {
        self.require(hook, PipelineState::Active)?;
        self.observe_unchecked(hook, call)
    }

    fn observe_unchecked<F>(&self, hook: Hook, mut call: F) -> Result<()>
    where
        F: FnMut(&mut dyn Plugin) -> anyhow::Result<()>,
    {
        for slot in &self.plugins {
            let mut plugin = lock(slot);
            if !plugin.implements(hook) {
                continue;
            }
            call(&mut **plugin).map_err(|source| plugin_error(plugin.name(), hook, source))?;
        }
        Ok(())
    }

    fn require(&self, hook: Hook, expected: PipelineState) -> Result<()> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(FreshetError::PipelineState {
                hook,
                state: state.as_str(),
            })
        }
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

fn lock(slot: &Mutex<Box<dyn Plugin>>) -> MutexGuard<'_, Box<dyn Plugin>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn plugin_error(plugin: &str, hook: Hook, source: anyhow::Error) -> FreshetError {
    FreshetError::Plugin {
        plugin: plugin.to_string(),
        hook,
        source,
    }
}
