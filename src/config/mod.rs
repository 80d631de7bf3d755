//! Configuration loading.
//!
//! The configuration is a TOML file, by default
//! `~/.config/freshet/config.toml`, with a `[general]` table, one `[[feed]]`
//! table per feed and one `[[output]]` table per output sink. Per-feed keys
//! the loader does not know are offered to the plugin pipeline through
//! `on-feed-config-item`.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::app::FreshetError;
use crate::domain::FeedDescriptor;
use crate::plugin::{FeedConfigItem, PluginPipeline};

pub const DEFAULT_MAX_THREADS: usize = 5;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_WRAP_WIDTH: usize = 79;
pub const SINK_KINDS: [&str; 2] = ["text", "html"];

/// Global run options from the `[general]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_threads: usize,
    pub cache_file: Option<PathBuf>,
    pub total_cache_backups: usize,
    pub no_cache_update: bool,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub show_dates: bool,
    pub show_authors: bool,
    pub show_format: bool,
    pub quiet: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_threads: DEFAULT_MAX_THREADS,
            cache_file: None,
            total_cache_backups: 0,
            no_cache_update: false,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            user_agent: concat!("freshet/", env!("CARGO_PKG_VERSION")).to_string(),
            show_dates: true,
            show_authors: true,
            show_format: false,
            quiet: false,
        }
    }
}

/// One `[[output]]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SinkSettings {
    pub kind: String,
    /// Defaults to the kind.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub save_as: Option<PathBuf>,
    /// Write to `save_as` only; nothing is reported on stdout.
    #[serde(default)]
    pub save_only: bool,
    #[serde(default = "default_wrap_width")]
    pub wrap_width: usize,
}

impl SinkSettings {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: kind.to_string(),
            save_as: None,
            save_only: false,
            wrap_width: DEFAULT_WRAP_WIDTH,
        }
    }
}

fn default_wrap_width() -> usize {
    DEFAULT_WRAP_WIDTH
}

#[derive(Debug, Deserialize)]
struct RawFeed {
    url: Option<String>,
    name: Option<String>,
    #[serde(default)]
    days_to_cache: u32,
    force_encoding: Option<String>,
    #[serde(default)]
    summary_only: bool,
    #[serde(default)]
    disabled: bool,
    #[serde(flatten)]
    extra: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    general: Settings,
    #[serde(rename = "feed")]
    feeds: Vec<RawFeed>,
    #[serde(rename = "output")]
    outputs: Vec<SinkSettings>,
}

/// A validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    /// Feeds in declaration order.
    pub feeds: Vec<FeedDescriptor>,
    pub outputs: Vec<SinkSettings>,
}

impl Config {
    /// Load and validate the configuration file at `path`.
    ///
    /// The pipeline must be active: unknown per-feed keys go through
    /// `on-feed-config-item`, and `on-post-config` runs once the feeds and
    /// outputs are validated.
    pub fn load(path: &Path, pipeline: &PluginPipeline) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = Self::parse(&content, path, pipeline)?;
        tracing::info!(
            "Loaded {} feeds and {} outputs from {}",
            config.feeds.len(),
            config.outputs.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_toml_str(content: &str, pipeline: &PluginPipeline) -> Result<Self, ConfigError> {
        Self::parse(content, Path::new("<inline>"), pipeline)
    }

    /// Get the default config file path: `~/.config/freshet/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("freshet").join("config.toml"))
    }

    /// Feeds that take part in acquisition.
    pub fn enabled_feeds(&self) -> impl Iterator<Item = &FeedDescriptor> {
        self.feeds.iter().filter(|f| f.enabled)
    }

    fn parse(content: &str, origin: &Path, pipeline: &PluginPipeline) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            source: e,
        })?;

        let mut settings = raw.general;
        if settings.max_threads == 0 {
            return Err(invalid("general", "max_threads must be at least 1"));
        }
        settings.cache_file = settings.cache_file.map(|p| expand_home(&p));

        if raw.feeds.is_empty() {
            return Err(ConfigError::NoFeeds);
        }

        let mut seen = HashSet::new();
        let mut feeds = Vec::with_capacity(raw.feeds.len());
        for (index, raw_feed) in raw.feeds.into_iter().enumerate() {
            let Some(feed) = build_feed(index, raw_feed, &settings, pipeline)? else {
                continue;
            };
            if !seen.insert(feed.url().clone()) {
                return Err(invalid(
                    feed.section(),
                    format!("duplicate feed URL {}", feed.url()),
                ));
            }
            feeds.push(feed);
        }

        let outputs = raw
            .outputs
            .into_iter()
            .map(validate_output)
            .collect::<Result<Vec<_>, _>>()?;

        let mut config = Config {
            settings,
            feeds,
            outputs,
        };
        pipeline
            .post_config(&mut config)
            .map_err(|e| ConfigError::Hook {
                section: "general".into(),
                source: Box::new(e),
            })?;
        Ok(config)
    }
}

/// Build one descriptor. `None` when a plugin vetoed the feed.
fn build_feed(
    index: usize,
    raw: RawFeed,
    settings: &Settings,
    pipeline: &PluginPipeline,
) -> Result<Option<FeedDescriptor>, ConfigError> {
    let section = raw
        .name
        .clone()
        .unwrap_or_else(|| format!("feed #{}", index + 1));

    let url = raw
        .url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| invalid(&section, "missing url"))?;
    let mut feed = FeedDescriptor::parse(url)
        .map_err(|e| invalid(&section, format!("bad url \"{}\": {}", url, e)))?;
    if let Some(name) = raw.name {
        feed = feed.with_section(name);
    }

    feed.set_days_to_cache(raw.days_to_cache);
    feed.set_force_encoding(raw.force_encoding);
    feed.summary_only = raw.summary_only;
    feed.enabled = !raw.disabled;

    for (name, value) in &raw.extra {
        let section = feed.section().to_string();
        let item = FeedConfigItem {
            section: &section,
            name,
            value,
        };
        let keep = pipeline
            .feed_config_item(&item, settings, &mut feed)
            .map_err(|e| ConfigError::Hook {
                section: section.clone(),
                source: Box::new(e),
            })?;
        if !keep {
            tracing::info!("[{}]: dropped by plugin at \"{}\"", section, name);
            return Ok(None);
        }
    }

    Ok(Some(feed))
}

fn validate_output(mut output: SinkSettings) -> Result<SinkSettings, ConfigError> {
    output.kind = output.kind.trim().to_ascii_lowercase();
    if output.name.trim().is_empty() {
        output.name = output.kind.clone();
    }
    if !SINK_KINDS.contains(&output.kind.as_str()) {
        return Err(invalid(
            &output.name,
            format!("unknown output kind \"{}\"", output.kind),
        ));
    }
    if output.save_only && output.save_as.is_none() {
        return Err(invalid(&output.name, "save_only requires save_as"));
    }
    if output.wrap_width == 0 {
        return Err(invalid(&output.name, "wrap_width must be at least 1"));
    }
    output.save_as = output.save_as.map(|p| expand_home(&p));
    Ok(output)
}

fn invalid(section: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        section: section.to_string(),
        message: message.into(),
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("[{section}]: {message}")]
    Invalid { section: String, message: String },

    #[error("No feeds configured")]
    NoFeeds,

    #[error("[{section}]: {source}")]
    Hook {
        section: String,
        source: Box<FreshetError>,
    },
}
