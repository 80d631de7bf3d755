use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use freshet::app::{execute, AppContext};
use freshet::cli::Cli;
use freshet::config::Config;
use freshet::output::create_sinks;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries the generated output.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("freshet: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when some output sink failed.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };

    let ctx = AppContext::with_builtin_plugins()?;
    ctx.pipeline.startup()?;

    let result = async {
        let config = Config::load(&path, &ctx.pipeline)?;
        let mut sinks = create_sinks(&config.outputs)?;
        let report = execute(&ctx, &config, &mut sinks, &cli.run_options()).await?;

        let mut stdout = std::io::stdout().lock();
        for output in &report.outputs {
            stdout.write_all(&output.bytes)?;
        }
        stdout.flush()?;

        for failure in &report.output_failures {
            eprintln!("freshet: output \"{}\": {}", failure.sink, failure.error);
        }
        if let Some(e) = &report.cache_error {
            eprintln!("freshet: {}", e);
        }
        if !config.settings.quiet {
            eprintln!(
                "freshet: {} new item(s) from {} feed(s); cache holds {} entries",
                report.new_items(),
                report.feeds.len(),
                report.cache_entries
            );
        }
        Ok::<_, anyhow::Error>(report.is_success())
    }
    .await;

    if let Err(e) = ctx.pipeline.shutdown() {
        tracing::warn!("Plugin shutdown failed: {}", e);
    }
    result
}
