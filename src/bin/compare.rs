use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bargain_scanner::comparison::{self, ComparisonEngine};
use bargain_scanner::config::Config;
use bargain_scanner::db::{self, comparisons};
use bargain_scanner::error::Result;
use bargain_scanner::realism::PriceTiers;

const TOP_BARGAINS: i64 = 10;

/// Score stored auctions against the market baseline.
#[derive(Parser, Debug)]
#[command(name = "compare", version)]
struct Args {
    /// SQLite database (overrides DB_PATH)
    #[arg(long)]
    db: Option<String>,
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
    if let Some(path) = args.db {
        cfg.db_path = path;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let pool = db::connect(&cfg.db_path).await?;
    let tiers = PriceTiers::load(cfg.price_tiers_path.as_deref()).await?;
    let engine = ComparisonEngine::new(tiers);

    let summary = comparison::run(&pool, &engine).await?;
    comparison::log_summary(&summary);

    let top = comparisons::top_bargains(&pool, TOP_BARGAINS).await?;
    if top.is_empty() {
        info!("No bargains found");
    } else {
        info!("Top {} bargains:", top.len());
    }
    for (i, c) in top.iter().enumerate() {
        info!(
            "  {:>2}. {:<10} {:<14} {:<20} {:>7.0} €/m² vs {:>7} €/m²  score {:>3}  {}{}",
            i + 1,
            c.auction_id,
            c.city,
            c.neighborhood.as_deref().unwrap_or("-"),
            c.auction_price_per_sqm,
            c.market_median_per_sqm
                .map(|m| format!("{m:.0}"))
                .unwrap_or_else(|| "-".to_string()),
            c.bargain_score.unwrap_or(0),
            c.rating,
            if c.price_capped { " (capped median)" } else { "" },
        );
    }

    pool.close().await;
    Ok(())
}
