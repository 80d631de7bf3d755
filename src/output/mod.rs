//! Output sinks and the orchestrator that drives them.
//!
//! A sink renders channels into an in-memory document. The orchestrator
//! hands every sink its own copy of each channel, so whatever a sink or a
//! plugin does to a copy never reaches another sink.

pub mod html;
pub mod orchestrator;
pub mod plain;
pub mod text;

use std::fs;
use std::path::Path;

use crate::app::{FreshetError, Result};
use crate::config::{SinkSettings, Settings};
use crate::domain::{Channel, FeedDescriptor, Item};

pub use html::HtmlSink;
pub use orchestrator::{GeneratedOutput, OutputReport};
pub use text::TextSink;

/// Something that renders channels.
pub trait OutputSink: Send {
    /// Prepare for a run. Called once per run before any `display`.
    fn init(&mut self, settings: &Settings, sink: &SinkSettings) -> Result<()>;

    /// Render one channel. `channel` is this sink's private copy.
    fn display(&mut self, channel: Channel, feed: &FeedDescriptor) -> Result<()>;

    /// Finish the document and write it to `save_as`, if configured.
    fn flush(&mut self) -> Result<()>;

    fn content_type(&self) -> &str;

    fn has_output(&self) -> bool;

    /// The rendered document, or `None` when the sink has nothing to report
    /// (no output, or output that only goes to a file).
    fn generated_output(&self) -> Result<Option<Vec<u8>>>;
}

/// Read-only view of a sink given to plugins.
#[derive(Clone, Copy)]
pub struct ReadOnlySink<'a> {
    settings: &'a SinkSettings,
    sink: &'a dyn OutputSink,
}

impl<'a> ReadOnlySink<'a> {
    pub fn new(settings: &'a SinkSettings, sink: &'a dyn OutputSink) -> Self {
        Self { settings, sink }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn kind(&self) -> &str {
        &self.settings.kind
    }

    pub fn settings(&self) -> &SinkSettings {
        self.settings
    }

    pub fn content_type(&self) -> &str {
        self.sink.content_type()
    }

    pub fn has_output(&self) -> bool {
        self.sink.has_output()
    }

    pub fn generated_output(&self) -> Result<Option<Vec<u8>>> {
        self.sink.generated_output()
    }
}

/// A sink together with its configuration and enablement.
pub struct ConfiguredSink {
    settings: SinkSettings,
    sink: Box<dyn OutputSink>,
    enabled: bool,
}

impl ConfiguredSink {
    pub fn new(settings: SinkSettings, sink: Box<dyn OutputSink>) -> Self {
        Self {
            settings,
            sink,
            enabled: true,
        }
    }

    /// Build the sink for `settings.kind`.
    pub fn from_settings(settings: SinkSettings) -> Result<Self> {
        let sink = create_sink(&settings.kind).ok_or_else(|| FreshetError::Output {
            sink: settings.name.clone(),
            message: format!("unknown output kind \"{}\"", settings.kind),
        })?;
        Ok(Self::new(settings, sink))
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &SinkSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Keep this sink out of every later run.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn read_only(&self) -> ReadOnlySink<'_> {
        ReadOnlySink::new(&self.settings, self.sink.as_ref())
    }

    pub fn sink_mut(&mut self) -> &mut dyn OutputSink {
        self.sink.as_mut()
    }
}

impl std::fmt::Debug for ConfiguredSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredSink")
            .field("name", &self.settings.name)
            .field("kind", &self.settings.kind)
            .field("enabled", &self.enabled)
            .finish()
    }
}

pub fn create_sink(kind: &str) -> Option<Box<dyn OutputSink>> {
    match kind {
        "text" => Some(Box::new(TextSink::new())),
        "html" => Some(Box::new(HtmlSink::new())),
        _ => None,
    }
}

/// Instantiate every configured sink, in configuration order.
pub fn create_sinks(outputs: &[SinkSettings]) -> Result<Vec<ConfiguredSink>> {
    outputs
        .iter()
        .cloned()
        .map(ConfiguredSink::from_settings)
        .collect()
}

/// Body to show for an item: the summary for summary-only feeds, otherwise
/// the richest content available.
pub(crate) fn item_body<'a>(item: &'a Item, feed: &FeedDescriptor) -> Option<&'a str> {
    const CONTENT_TYPES: [&str; 3] = ["text/html", "application/xhtml+xml", "text/plain"];

    let summary = item.summary.as_deref().filter(|s| !s.trim().is_empty());
    if feed.summary_only {
        return summary;
    }
    item.first_content_of_type(&CONTENT_TYPES)
        .filter(|c| !c.trim().is_empty())
        .or(summary)
}

pub(crate) fn save(sink: &str, path: &Path, bytes: &[u8]) -> Result<()> {
    let output_err = |e: std::io::Error| FreshetError::Output {
        sink: sink.to_string(),
        message: format!("cannot write {}: {}", path.display(), e),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(output_err)?;
    }
    fs::write(path, bytes).map_err(output_err)?;
    tracing::info!("Output \"{}\" saved to {}", sink, path.display());
    Ok(())
}
