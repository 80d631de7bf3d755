//! One batch run: cache load, acquisition, output, cache save.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::app::{AppContext, FreshetError, Result, SinkFailure};
use crate::cache::FeedCache;
use crate::config::Config;
use crate::domain::FeedDescriptor;
use crate::fetcher::parallel::{ChannelSet, ParallelFetcher};
use crate::output::orchestrator::{run_outputs, GeneratedOutput, OutputReport};
use crate::output::{create_sinks, ConfiguredSink};
use crate::plugin::Hook;

/// Per-invocation overrides.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Load and update the cache file, when one is configured.
    pub use_cache: bool,
    /// Pretend the run happens at this time.
    pub current_time: Option<DateTime<Utc>>,
    /// Overrides `max_threads` from the configuration.
    pub max_threads: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            current_time: None,
            max_threads: None,
        }
    }
}

/// One reported feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSummary {
    pub url: String,
    pub items: usize,
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// Feeds that had something to report, in configuration order.
    pub feeds: Vec<FeedSummary>,
    pub outputs: Vec<GeneratedOutput>,
    pub output_failures: Vec<SinkFailure>,
    pub cache_entries: usize,
    pub cache_added: usize,
    pub cache_expired: usize,
    /// Set when the cache could not be saved. The run still counts.
    pub cache_error: Option<FreshetError>,
}

impl RunReport {
    pub fn new_items(&self) -> usize {
        self.feeds.iter().map(|f| f.items).sum()
    }

    pub fn is_success(&self) -> bool {
        self.output_failures.is_empty()
    }

    /// The generated outputs, or the collected sink failures.
    pub fn into_result(self) -> Result<Vec<GeneratedOutput>> {
        OutputReport {
            produced: self.outputs,
            failures: self.output_failures,
        }
        .into_result()
    }
}

/// Load the configuration at `path` and run it once.
///
/// The context's pipeline must already be started.
pub async fn run_config(ctx: &AppContext, path: &Path, options: &RunOptions) -> Result<RunReport> {
    let config = Config::load(path, &ctx.pipeline)?;
    let mut sinks = create_sinks(&config.outputs)?;
    execute(ctx, &config, &mut sinks, options).await
}

/// Run a loaded configuration once.
///
/// Only configuration problems and "no enabled feed" fail the run. Sink
/// failures and a failed cache save are carried in the report.
pub async fn execute(
    ctx: &AppContext,
    config: &Config,
    sinks: &mut [ConfiguredSink],
    options: &RunOptions,
) -> Result<RunReport> {
    let settings = &config.settings;
    let now = options.current_time.unwrap_or_else(Utc::now);
    let feeds: Vec<Arc<FeedDescriptor>> = config.feeds.iter().cloned().map(Arc::new).collect();

    let cache_path = settings.cache_file.as_deref().filter(|_| options.use_cache);
    let cache = match cache_path {
        Some(path) => {
            let cache = FeedCache::load(path, now, &config.feeds);
            if let Err(e) = ctx.pipeline.cache_loaded(&cache) {
                tracing::error!(
                    "{} failed, continuing with the loaded cache: {}",
                    Hook::CacheLoaded,
                    e
                );
            }
            Some(Arc::new(cache))
        }
        None => {
            tracing::debug!("Running without a cache");
            None
        }
    };

    let workers = options.max_threads.unwrap_or(settings.max_threads);
    let scheduler = ParallelFetcher::with_workers(
        ctx.fetcher(settings)?,
        Arc::clone(&ctx.parsers),
        workers,
    )
    .with_fetch_timeout(Duration::from_secs(settings.fetch_timeout_secs));

    let channels = scheduler
        .fetch_all(&feeds, cache.clone(), Arc::clone(&ctx.pipeline))
        .await?;

    let output = if channels.is_empty() {
        tracing::info!("Nothing new to report");
        OutputReport::default()
    } else {
        run_outputs(sinks, &channels, settings, &ctx.pipeline)
    };

    let mut report = RunReport {
        feeds: summarize(&channels),
        outputs: output.produced,
        output_failures: output.failures,
        ..RunReport::default()
    };

    if let (Some(cache), Some(path)) = (cache, cache_path) {
        if settings.no_cache_update {
            tracing::info!("Cache updates disabled; not saving {}", path.display());
        } else if let Err(e) = save_cache(ctx, &cache, path, settings.total_cache_backups) {
            tracing::error!("Cache not saved: {}", e);
            report.cache_error = Some(e);
        }
        report.cache_entries = cache.len();
        report.cache_added = cache.added_count();
        report.cache_expired = cache.expired_count();
    }

    if !report.output_failures.is_empty() {
        tracing::error!("{} output sink(s) failed", report.output_failures.len());
    }
    Ok(report)
}

fn save_cache(ctx: &AppContext, cache: &FeedCache, path: &Path, backups: usize) -> Result<()> {
    ctx.pipeline.pre_cache_save(cache)?;
    cache.save(path, backups)
}

fn summarize(channels: &ChannelSet) -> Vec<FeedSummary> {
    channels
        .iter()
        .map(|(feed, channel)| FeedSummary {
            url: feed.url().to_string(),
            items: channel.len(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::memory::MemoryFetcher;
    use crate::plugin::{Plugin, PluginPipeline};
    use chrono::{Duration as ChronoDuration, TimeZone};

    const A: &str = "https://a.example.com/feed.xml";
    const B: &str = "https://b.example.com/feed.xml";
    const C: &str = "https://c.example.com/feed.xml";

    fn rss(ids: &[&str]) -> String {
        let items: String = ids
            .iter()
            .map(|id| format!("<item><title>Item {id}</title><guid>{id}</guid></item>"))
            .collect();
        format!("<rss version=\"2.0\"><channel><title>Feed</title>{items}</channel></rss>")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 7, 30, 0).unwrap()
    }

    fn context(fetcher: MemoryFetcher) -> AppContext {
        let ctx = AppContext::with_builtin_plugins()
            .unwrap()
            .with_fetcher(Arc::new(fetcher));
        ctx.pipeline.startup().unwrap();
        ctx
    }

    fn config(ctx: &AppContext, cache_file: &Path) -> Config {
        let content = format!(
            r#"
[general]
max_threads = 2
cache_file = "{}"
total_cache_backups = 1

[[feed]]
url = "{A}"
days_to_cache = 1

[[feed]]
url = "{B}"
days_to_cache = 1

[[feed]]
url = "{C}"
days_to_cache = 1

[[output]]
kind = "text"
"#,
            cache_file.display()
        );
        Config::from_toml_str(&content, &ctx.pipeline).unwrap()
    }

    fn abc() -> MemoryFetcher {
        MemoryFetcher::new()
            .with_feed(A, rss(&["a1", "a2"]))
            .with_feed(B, rss(&[]))
            .with_feed(C, rss(&["c1"]))
    }

    fn at(time: DateTime<Utc>) -> RunOptions {
        RunOptions {
            current_time: Some(time),
            ..RunOptions::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_first_run_reports_then_rerun_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let cache_file = dir.path().join("cache.jsonl");
        let ctx = context(abc());
        let config = config(&ctx, &cache_file);
        let mut sinks = create_sinks(&config.outputs).unwrap();

        let first = execute(&ctx, &config, &mut sinks, &at(now())).await.unwrap();
        assert_eq!(
            first.feeds,
            vec![
                FeedSummary { url: A.into(), items: 2 },
                FeedSummary { url: C.into(), items: 1 },
            ]
        );
        assert_eq!(first.new_items(), 3);
        assert_eq!(first.cache_entries, 3);
        assert_eq!(first.cache_added, 3);
        assert!(first.cache_error.is_none());
        let text = String::from_utf8(first.outputs[0].bytes.clone()).unwrap();
        assert!(text.find("Item a1").unwrap() < text.find("Item c1").unwrap());

        let second = execute(&ctx, &config, &mut sinks, &at(now())).await.unwrap();
        assert!(second.feeds.is_empty());
        assert!(second.outputs.is_empty());
        assert_eq!(second.cache_entries, 3);
        assert_eq!(second.cache_added, 0);
        assert!(std::fs::metadata(dir.path().join("cache.jsonl.1")).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_items_come_back_after_retention() {
        let dir = tempfile::tempdir().unwrap();
        let cache_file = dir.path().join("cache.jsonl");
        let ctx = context(abc());
        let config = config(&ctx, &cache_file);
        let mut sinks = create_sinks(&config.outputs).unwrap();

        execute(&ctx, &config, &mut sinks, &at(now())).await.unwrap();

        let boundary = now() + ChronoDuration::days(1);
        let quiet = execute(&ctx, &config, &mut sinks, &at(boundary)).await.unwrap();
        assert_eq!(quiet.new_items(), 0);

        let later = boundary + ChronoDuration::days(1) + ChronoDuration::seconds(1);
        let again = execute(&ctx, &config, &mut sinks, &at(later)).await.unwrap();
        assert_eq!(again.new_items(), 3);
        assert_eq!(again.cache_expired, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_cache_reports_everything_every_time() {
        let dir = tempfile::tempdir().unwrap();
        let cache_file = dir.path().join("cache.jsonl");
        let ctx = context(abc());
        let config = config(&ctx, &cache_file);
        let mut sinks = create_sinks(&config.outputs).unwrap();
        let options = RunOptions {
            use_cache: false,
            ..at(now())
        };

        for _ in 0..2 {
            let report = execute(&ctx, &config, &mut sinks, &options).await.unwrap();
            assert_eq!(report.new_items(), 3);
        }
        assert!(!cache_file.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_cache_update_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let cache_file = dir.path().join("cache.jsonl");
        let ctx = context(abc());
        let mut config = config(&ctx, &cache_file);
        config.settings.no_cache_update = true;
        let mut sinks = create_sinks(&config.outputs).unwrap();

        let report = execute(&ctx, &config, &mut sinks, &at(now())).await.unwrap();
        assert_eq!(report.new_items(), 3);
        assert!(!cache_file.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cache_save_failure_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let ctx = context(abc());
        let config = config(&ctx, &blocker.join("cache.jsonl"));
        let mut sinks = create_sinks(&config.outputs).unwrap();

        let report = execute(&ctx, &config, &mut sinks, &at(now())).await.unwrap();
        assert_eq!(report.new_items(), 3);
        assert!(matches!(report.cache_error, Some(FreshetError::CacheIo { .. })));
        assert!(report.is_success());
    }

    struct BrokenCacheObserver;

    impl Plugin for BrokenCacheObserver {
        fn name(&self) -> &str {
            "broken-cache-observer"
        }

        fn hooks(&self) -> &[Hook] {
            &[Hook::CacheLoaded]
        }

        fn on_cache_loaded(&mut self, _cache: &FeedCache) -> anyhow::Result<()> {
            anyhow::bail!("plugin bug")
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cache_loaded_failure_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let cache_file = dir.path().join("cache.jsonl");
        let pipeline = PluginPipeline::with_plugins(vec![Box::new(BrokenCacheObserver)]).unwrap();
        pipeline.startup().unwrap();
        let ctx = AppContext::new(Arc::new(pipeline)).with_fetcher(Arc::new(abc()));
        let config = config(&ctx, &cache_file);
        let mut sinks = create_sinks(&config.outputs).unwrap();

        let report = execute(&ctx, &config, &mut sinks, &at(now())).await.unwrap();
        assert_eq!(report.new_items(), 3);
        assert_eq!(report.outputs.len(), 1);
        assert!(cache_file.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_all_disabled_is_fatal() {
        let ctx = context(abc());
        let content = format!("[[feed]]\nurl = \"{A}\"\ndisabled = true\n");
        let config = Config::from_toml_str(&content, &ctx.pipeline).unwrap();

        let err = execute(&ctx, &config, &mut [], &at(now())).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(abc());
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!("[[feed]]\nurl = \"{C}\"\n\n[[output]]\nkind = \"html\"\n"),
        )
        .unwrap();

        let report = run_config(&ctx, &path, &at(now())).await.unwrap();
        assert_eq!(report.outputs.len(), 1);
        assert_eq!(report.outputs[0].content_type, "text/html");
    }
}
