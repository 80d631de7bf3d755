use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;

use crate::app::RunOptions;

#[derive(Parser, Debug)]
#[command(name = "freshet")]
#[command(about = "Reports what is new in a list of RSS/Atom/JSON feeds since the last run", long_about = None)]
pub struct Cli {
    /// Configuration file (default: ~/.config/freshet/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Neither read nor update the cache file
    #[arg(long)]
    pub no_cache: bool,

    /// Pretend the run happens at this time (RFC 3339 or YYYY-MM-DD)
    #[arg(short, long, value_parser = parse_time)]
    pub time: Option<DateTime<Utc>>,

    /// Number of parallel fetch workers (overrides max_threads)
    #[arg(short = 'T', long, value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: Option<u16>,
}

impl Cli {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            use_cache: !self.no_cache,
            current_time: self.time,
            max_threads: self.threads.map(usize::from),
        }
    }
}

/// Parse an RFC 3339 timestamp, or a bare date taken as midnight UTC.
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("\"{}\" is neither RFC 3339 nor YYYY-MM-DD", value))
}
