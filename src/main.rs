mod aggregate;
mod config;
mod dispatcher;
mod executor;
mod progress;
mod report;
mod stats;

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use aggregate::AggregateState;
use config::RunConfig;
use dispatcher::Dispatcher;
use executor::RequestExecutor;
use progress::{NoProgress, ProgressBar, ProgressSink};
use report::Report;

#[derive(Parser, Debug)]
#[command(author, version, about = "Load an URL with HTTP requests", long_about = None)]
struct Args {
    /// Target URL
    #[arg(required = true)]
    url: String,

    /// Number of requests to send
    #[arg(short = 'r', long, default_value_t = config::DEFAULT_REQUESTS as i64, allow_negative_numbers = true)]
    requests: i64,

    /// Number of requests in flight at the same time
    #[arg(short = 'c', long, default_value_t = config::DEFAULT_CONCURRENCY as i64, allow_negative_numbers = true)]
    concurrency: i64,

    /// Timeout of each HTTP request in seconds
    #[arg(short = 't', long, default_value_t = config::DEFAULT_TIMEOUT_SECS, allow_negative_numbers = true)]
    timeout: f64,

    /// HTTP body to send in every request (switches the method to POST)
    #[arg(short = 'b', long)]
    body: Option<String>,

    /// Timing histogram bars count (0 to disable)
    #[arg(long, default_value_t = config::DEFAULT_HISTOGRAM_BINS as i64, allow_negative_numbers = true)]
    histogram: i64,

    /// Number of runtime worker threads
    #[arg(long, default_value_t = num_cpus::get())]
    threads: usize,

    /// Do not draw the progress bar
    #[arg(short = 'q', long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Logs go to stderr so they never mix with the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = RunConfig::new(
        &args.url,
        args.requests,
        args.concurrency,
        args.timeout,
        args.body,
        args.histogram,
    )?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.threads.max(1))
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    let report = runtime.block_on(run(&config, !args.quiet))?;
    report.print().context("failed to write the report")?;
    Ok(())
}

async fn run(config: &RunConfig, show_progress: bool) -> Result<Report> {
    let start = Instant::now();

    println!(
        "Running {} requests with concurrency of {} to URL: {} ...",
        config.requests, config.concurrency, config.url
    );
    tracing::info!(
        requests = config.requests,
        concurrency = config.concurrency,
        timeout_ms = config.timeout.as_millis() as u64,
        "Starting run"
    );

    let dispatcher = Dispatcher::from_config(RequestExecutor::new(config)?, config);
    let mut progress: Box<dyn ProgressSink> = if show_progress {
        Box::new(ProgressBar::new(config.requests))
    } else {
        Box::new(NoProgress)
    };

    let mut aggregate = AggregateState::new();
    let dispatched = dispatcher
        .run(progress.as_mut(), |batch| aggregate.record_batch(&batch))
        .await?;

    tracing::info!(
        dispatched,
        timeouts = aggregate.timeouts,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Run finished"
    );
    Ok(Report::build(config, aggregate, start.elapsed()))
}
