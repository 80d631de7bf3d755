//! Drives every enabled sink through one run.
//!
//! Per sink: `init`, then for each surviving feed in configuration order a
//! private channel copy goes through `on-pre-feed-output`, `display` and
//! `on-post-feed-output`; then `flush` and `on-post-sink-flush`, which may
//! disable the sink. Finally `on-post-output` sees every sink that produced
//! output.
//!
//! Sink failures do not stop the other sinks. They are collected in the
//! [`OutputReport`] and reported once every sink was attempted.

use crate::app::{FreshetError, Result, SinkFailure};
use crate::config::Settings;
use crate::fetcher::parallel::ChannelSet;
use crate::output::ConfiguredSink;
use crate::plugin::PluginPipeline;

/// Output one sink produced and reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedOutput {
    pub sink: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct OutputReport {
    pub produced: Vec<GeneratedOutput>,
    pub failures: Vec<SinkFailure>,
}

impl OutputReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// The produced outputs, or every collected failure.
    pub fn into_result(self) -> Result<Vec<GeneratedOutput>> {
        if self.failures.is_empty() {
            Ok(self.produced)
        } else {
            Err(FreshetError::OutputFailures(self.failures))
        }
    }
}

/// Run every enabled sink over `channels`.
pub fn run_outputs(
    sinks: &mut [ConfiguredSink],
    channels: &ChannelSet,
    settings: &Settings,
    pipeline: &PluginPipeline,
) -> OutputReport {
    let mut report = OutputReport::default();
    let mut reporting = Vec::new();

    for (index, sink) in sinks.iter_mut().enumerate() {
        if !sink.is_enabled() {
            tracing::debug!("Output \"{}\" is disabled", sink.name());
            continue;
        }

        match drive(sink, channels, settings, pipeline) {
            Ok(true) => reporting.push(index),
            Ok(false) => {}
            Err(error) => {
                tracing::warn!("Output \"{}\": {}", sink.name(), error);
                report.failures.push(SinkFailure {
                    sink: sink.name().to_string(),
                    error,
                });
            }
        }
    }

    let mut views = Vec::with_capacity(reporting.len());
    for &index in &reporting {
        let view = sinks[index].read_only();
        match view.generated_output() {
            Ok(Some(bytes)) => report.produced.push(GeneratedOutput {
                sink: view.name().to_string(),
                content_type: view.content_type().to_string(),
                bytes,
            }),
            Ok(None) => {}
            Err(error) => {
                report.failures.push(SinkFailure {
                    sink: view.name().to_string(),
                    error,
                });
                continue;
            }
        }
        views.push(view);
    }

    if let Err(error) = pipeline.post_output(&views) {
        tracing::warn!("Post-output hook failed: {}", error);
        report.failures.push(SinkFailure {
            sink: "(all)".into(),
            error,
        });
    }

    report
}

/// Drive one sink. `Ok(true)` when it produced output that stays enabled.
fn drive(
    sink: &mut ConfiguredSink,
    channels: &ChannelSet,
    settings: &Settings,
    pipeline: &PluginPipeline,
) -> Result<bool> {
    let sink_settings = sink.settings().clone();
    sink.sink_mut().init(settings, &sink_settings)?;

    for (feed, channel) in channels {
        let mut copy = channel.make_copy();
        if !pipeline.pre_feed_output(feed, &mut copy, &sink.read_only())? {
            tracing::debug!("Output \"{}\": skipping {}", sink.name(), feed.url());
            continue;
        }
        sink.sink_mut().display(copy, feed)?;
        pipeline.post_feed_output(feed, &sink.read_only())?;
    }

    sink.sink_mut().flush()?;

    if !pipeline.post_sink_flush(&sink.read_only())? {
        tracing::info!("Output \"{}\" disabled by plugin", sink.name());
        sink.disable();
        return Ok(false);
    }

    Ok(sink.read_only().has_output())
}
