use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::plugin::Hook;

#[derive(Error, Debug)]
pub enum FreshetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Fetch of {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("Fetch of {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("Plugin \"{plugin}\" failed in {hook}: {source}")]
    Plugin {
        plugin: String,
        hook: Hook,
        #[source]
        source: anyhow::Error,
    },

    #[error("Plugin pipeline is {state}; cannot run {hook}")]
    PipelineState { hook: Hook, state: &'static str },

    #[error("Cache I/O error on {path}: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output sink \"{sink}\" failed: {message}")]
    Output { sink: String, message: String },

    #[error("{} output sink(s) failed", .0.len())]
    OutputFailures(Vec<SinkFailure>),

    #[error("All configured feeds are disabled")]
    AllFeedsDisabled,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl FreshetError {
    /// Errors that end the whole run rather than a single feed or sink.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FreshetError::Config(_) | FreshetError::AllFeedsDisabled
        )
    }
}

/// One sink that failed during output, kept so every sink can be attempted
/// before the run reports.
#[derive(Debug)]
pub struct SinkFailure {
    pub sink: String,
    pub error: FreshetError,
}

pub type Result<T> = std::result::Result<T, FreshetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(FreshetError::AllFeedsDisabled.is_fatal());
        assert!(FreshetError::Config(ConfigError::NoFeeds).is_fatal());
        assert!(!FreshetError::FeedParse("bad xml".into()).is_fatal());
        assert!(!FreshetError::Timeout {
            url: "https://example.com/feed".into(),
            secs: 30
        }
        .is_fatal());
    }

    #[test]
    fn test_output_failures_message_counts_sinks() {
        let err = FreshetError::OutputFailures(vec![
            SinkFailure {
                sink: "text".into(),
                error: FreshetError::Other("disk full".into()),
            },
            SinkFailure {
                sink: "html".into(),
                error: FreshetError::Other("disk full".into()),
            },
        ]);
        assert_eq!(err.to_string(), "2 output sink(s) failed");
    }
}
