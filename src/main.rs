use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bargain_scanner::config::{Config, UNIT_TARGETS};
use bargain_scanner::db;
use bargain_scanner::error::Result;
use bargain_scanner::fetcher::{FetchPolicy, HttpFetcher};
use bargain_scanner::scrape::{log_report, Pipeline, RunState, ScrapeOptions};
use bargain_scanner::shutdown::{cancel_pair, spawn_signal_listener};
use bargain_scanner::sources::SourceRegistry;

/// Scrape market listings into the local baseline.
#[derive(Parser, Debug)]
#[command(name = "scrape", version)]
struct Args {
    /// Continue today's checkpoint instead of starting over
    #[arg(long)]
    resume: bool,

    /// Units scraped in parallel (overrides SCRAPE_CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let mut cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };
    if let Some(n) = args.concurrency {
        cfg.concurrency = n.max(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    match run(cfg, args.resume).await {
        Ok(state) => std::process::exit(state.exit_code()),
        Err(e) => {
            error!("Fatal error: {e}");
            std::process::exit(RunState::Failed.exit_code());
        }
    }
}

async fn run(cfg: Config, resume: bool) -> Result<RunState> {
    let (cancel_handle, cancel) = cancel_pair();
    spawn_signal_listener(cancel_handle);

    let pool = db::connect(&cfg.db_path).await?;
    let fetcher = HttpFetcher::new(FetchPolicy::from_config(&cfg))?;
    let registry = SourceRegistry::with_defaults(cfg.imot_max_listings);
    info!(
        concurrency = cfg.concurrency,
        min_listings = cfg.min_listings_per_unit,
        "Scraping {} units",
        UNIT_TARGETS.len()
    );

    let pipeline = Pipeline::new(
        pool.clone(),
        Arc::new(fetcher),
        registry,
        UNIT_TARGETS.to_vec(),
        ScrapeOptions::from_config(&cfg, resume),
    );
    let report = pipeline.run(cancel).await?;
    log_report(&report);

    pool.close().await;
    Ok(report.state)
}
