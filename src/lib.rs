//! # Freshet
//!
//! A batch feed aggregator: fetch a configured list of RSS/Atom/JSON feeds,
//! report only the items not seen within each feed's retention window, and
//! render them through one or more output sinks.
//!
//! ## Architecture
//!
//! ```text
//! Config → ParallelFetcher (cache, plugins) → Output orchestrator → sinks
//! ```
//!
//! - [`cache`]: item-identity cache with per-feed retention
//! - [`fetcher`]: transports and the bounded acquisition worker pool
//! - [`plugin`]: ordered plugin pipeline with gating and observing hooks
//! - [`output`]: sinks and the orchestrator that drives them
//!
//! ## Quick Start
//!
//! ```bash
//! # Report what is new since the last run
//! freshet --config ~/.config/freshet/config.toml
//!
//! # Replay a run as of a given day without touching the cache
//! freshet --time 2024-06-01 --no-cache
//! ```

/// Application context, the run driver and error handling.
///
/// [`execute`](app::execute) runs one loaded configuration: cache load,
/// acquisition, output, cache save.
pub mod app;

/// Feed cache: "is this item new?" plus the JSON-lines file it persists to.
pub mod cache;

/// Command-line interface using clap.
pub mod cli;

/// TOML configuration: `[general]`, `[[feed]]` and `[[output]]` tables.
pub mod config;

/// Core domain models.
///
/// - [`FeedDescriptor`](domain::FeedDescriptor): one configured feed
/// - [`Channel`](domain::Channel): a parsed feed and its items
/// - [`Item`](domain::Item): one entry with its cache key
pub mod domain;

/// Feed acquisition.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for raw feed retrieval
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
/// - [`ParallelFetcher`](fetcher::parallel::ParallelFetcher): worker pool with
///   start and completion barriers
pub mod fetcher;

/// Feed parsing and normalization.
///
/// Converts RSS 0.9x/1.0/2.0, Atom and JSON Feed into
/// [`Channel`](domain::Channel)s, honoring forced or declared encodings.
pub mod normalizer;

/// Output sinks and orchestration.
pub mod output;

/// Plugin trait, hooks and the pipeline that runs them.
pub mod plugin;
