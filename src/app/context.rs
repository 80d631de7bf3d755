use std::sync::Arc;

use crate::app::Result;
use crate::config::Settings;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::Fetcher;
use crate::normalizer::{NormalizerFactory, ParserFactory};
use crate::plugin::builtin::builtin_plugins;
use crate::plugin::PluginPipeline;

/// Wires the long-lived pieces of a freshet process together.
///
/// Without an explicit fetcher, every run builds an [`HttpFetcher`] from
/// the loaded settings (user agent, timeout).
pub struct AppContext {
    pub pipeline: Arc<PluginPipeline>,
    pub parsers: Arc<dyn ParserFactory>,
    fetcher: Option<Arc<dyn Fetcher + Send + Sync>>,
}

impl AppContext {
    pub fn new(pipeline: Arc<PluginPipeline>) -> Self {
        Self {
            pipeline,
            parsers: Arc::new(NormalizerFactory),
            fetcher: None,
        }
    }

    /// Context with every built-in plugin loaded (not yet started).
    pub fn with_builtin_plugins() -> Result<Self> {
        let pipeline = PluginPipeline::with_plugins(builtin_plugins())?;
        Ok(Self::new(Arc::new(pipeline)))
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_parsers(mut self, parsers: Arc<dyn ParserFactory>) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn fetcher(&self, settings: &Settings) -> Result<Arc<dyn Fetcher + Send + Sync>> {
        match &self.fetcher {
            Some(fetcher) => Ok(Arc::clone(fetcher)),
            None => Ok(Arc::new(HttpFetcher::from_settings(settings)?)),
        }
    }
}
