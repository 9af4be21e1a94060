use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::checkpoint::CheckpointManager;
use crate::config::{Config, UnitTarget, DATA_RETENTION_DAYS};
use crate::db::market;
use crate::db::writer::DbWriter;
use crate::error::Result;
use crate::export;
use crate::fetcher::PageFetcher;
use crate::scrape::unit::{scrape_unit, UnitContext};
use crate::scrape::{terminal_state, RunState, UnitReport, UnitStatus};
use crate::shutdown::CancelToken;
use crate::sources::SourceRegistry;
use crate::types::UnitKey;

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Continue today's checkpoint instead of starting over.
    pub resume: bool,
    pub concurrency: usize,
    pub min_listings: usize,
    pub max_retries: u32,
    pub checkpoint_dir: PathBuf,
    pub export_path: PathBuf,
    /// Date naming the checkpoint file.
    pub run_date: NaiveDate,
}

impl ScrapeOptions {
    pub fn from_config(cfg: &Config, resume: bool) -> Self {
        Self {
            resume,
            concurrency: cfg.concurrency,
            min_listings: cfg.min_listings_per_unit,
            max_retries: cfg.fetch_max_retries,
            checkpoint_dir: cfg.checkpoint_dir.clone(),
            export_path: cfg.export_path.clone(),
            run_date: Local::now().date_naive(),
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub state: RunState,
    /// Sorted by unit.
    pub units: Vec<UnitReport>,
    pub purged: u64,
    /// Listings in the exported snapshot, when the export ran.
    pub exported: Option<usize>,
}

pub struct Pipeline {
    pool: SqlitePool,
    fetcher: Arc<dyn PageFetcher>,
    registry: SourceRegistry,
    targets: Vec<UnitTarget>,
    opts: ScrapeOptions,
}

impl Pipeline {
    pub fn new(
        pool: SqlitePool,
        fetcher: Arc<dyn PageFetcher>,
        registry: SourceRegistry,
        targets: Vec<UnitTarget>,
        opts: ScrapeOptions,
    ) -> Self {
        Self { pool, fetcher, registry, targets, opts }
    }

    /// Run every unit not yet checkpointed and gate the export on the outcome.
    /// Unit problems never surface as `Err`; only storage setup failures do.
    pub async fn run(self, cancel: CancelToken) -> Result<RunReport> {
        let cutoff = Utc::now() - chrono::Duration::days(DATA_RETENTION_DAYS);
        let purged = market::purge_older_than(&self.pool, cutoff).await?;
        if purged > 0 {
            info!(purged, days = DATA_RETENTION_DAYS, "Purged stale market listings");
        }

        let mut checkpoint = if self.opts.resume {
            CheckpointManager::load(&self.opts.checkpoint_dir, self.opts.run_date).await
        } else {
            let fresh = CheckpointManager::new(&self.opts.checkpoint_dir, self.opts.run_date);
            fresh.clear().await?;
            fresh.save().await?;
            fresh
        };
        info!(
            path = %checkpoint.path().display(),
            date = %checkpoint.date(),
            resume = self.opts.resume,
            units = self.targets.len(),
            "Scrape run starting"
        );

        let (writer, writer_handle) = DbWriter::channel(self.pool.clone());
        let writer_task = tokio::spawn(writer.run());

        let ctx = Arc::new(UnitContext {
            fetcher: self.fetcher,
            registry: self.registry,
            writer: writer_handle,
            cancel,
            max_retries: self.opts.max_retries,
            min_listings: self.opts.min_listings,
        });
        let semaphore = Arc::new(Semaphore::new(self.opts.concurrency.max(1)));
        let mut workers = JoinSet::new();
        let mut units = Vec::with_capacity(self.targets.len());

        for target in self.targets {
            if let Some(rec) = checkpoint.record(target.city, target.source) {
                info!(city = target.city, source = target.source, "Already in checkpoint, skipping");
                units.push(UnitReport {
                    unit: UnitKey::new(target.city, target.source),
                    status: UnitStatus::Skipped { success: rec.success, count: rec.count },
                });
                continue;
            }

            let ctx = Arc::clone(&ctx);
            let semaphore = Arc::clone(&semaphore);
            workers.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return not_started(&target);
                };
                if ctx.cancel.is_cancelled() {
                    return not_started(&target);
                }
                scrape_unit(&ctx, target).await
            });
        }

        let mut crashed = false;
        while let Some(joined) = workers.join_next().await {
            let report = match joined {
                Ok(report) => report,
                Err(e) => {
                    error!("Unit worker crashed: {e}");
                    crashed = true;
                    continue;
                }
            };
            let outcome = match &report.status {
                UnitStatus::Succeeded { count } => Some((true, *count, None)),
                UnitStatus::Failed { count, error } => Some((false, *count, Some(error.clone()))),
                _ => None,
            };
            if let Some((success, count, err)) = outcome {
                if let Err(e) = checkpoint
                    .mark_done(&report.unit.city, &report.unit.source, success, count, err)
                    .await
                {
                    error!(unit = %report.unit, "Checkpoint write failed: {e}");
                }
            }
            units.push(report);
        }

        // Last handle gone: the writer drains and exits.
        drop(ctx);
        if let Err(e) = writer_task.await {
            error!("Listing writer crashed: {e}");
            crashed = true;
        }

        units.sort_by(|a, b| a.unit.cmp(&b.unit));
        let mut state = if crashed { RunState::Failed } else { terminal_state(&units) };

        let mut exported = None;
        if state == RunState::Success {
            match export::write_snapshot(&self.pool, &self.opts.export_path).await {
                Ok(n) => {
                    exported = Some(n);
                    checkpoint.clear().await?;
                }
                Err(e) => {
                    error!(path = %self.opts.export_path.display(), "Export failed: {e}");
                    state = RunState::Failed;
                }
            }
        } else {
            warn!(state = %state, "Export skipped; market snapshot left untouched");
        }

        Ok(RunReport { state, units, purged, exported })
    }
}

fn not_started(target: &UnitTarget) -> UnitReport {
    UnitReport {
        unit: UnitKey::new(target.city, target.source),
        status: UnitStatus::NotStarted,
    }
}

/// Per-unit result table and the final verdict.
pub fn log_report(report: &RunReport) {
    info!("Scrape summary ({} units):", report.units.len());
    for u in &report.units {
        info!("  {:<28} {}", u.unit.to_string(), u.status);
    }
    let saved: usize = report
        .units
        .iter()
        .map(|u| match &u.status {
            UnitStatus::Succeeded { count }
            | UnitStatus::Failed { count, .. }
            | UnitStatus::Interrupted { count } => *count,
            _ => 0,
        })
        .sum();
    info!(
        state = %report.state,
        saved,
        purged = report.purged,
        exported = ?report.exported,
        "Scrape finished: {} (exit {})",
        report.state,
        report.state.exit_code(),
    );
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::db::market::upsert_listing;
    use crate::db::test_pool;
    use crate::scrape::testing::{olx_page, StubFetcher};
    use crate::shutdown::cancel_pair;
    use crate::types::MarketListing;

    const VARNA: UnitTarget = UnitTarget { city: "Варна", source: "olx.bg", url: "http://stub/varna" };
    const RUSE: UnitTarget = UnitTarget { city: "Русе", source: "olx.bg", url: "http://stub/ruse" };

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn opts(dir: &Path, resume: bool, concurrency: usize) -> ScrapeOptions {
        ScrapeOptions {
            resume,
            concurrency,
            min_listings: 5,
            max_retries: 1,
            checkpoint_dir: dir.to_path_buf(),
            export_path: dir.join("market_listings.json"),
            run_date: date(),
        }
    }

    fn five(base: f64) -> String {
        olx_page(&[
            (50.0, base),
            (60.0, base + 50.0),
            (70.0, base + 100.0),
            (80.0, base + 150.0),
            (90.0, base + 200.0),
        ])
    }

    fn full_site() -> StubFetcher {
        StubFetcher::new()
            .page(VARNA.url, &five(1500.0))
            .page(RUSE.url, &five(900.0))
    }

    async fn run(pool: &SqlitePool, fetcher: StubFetcher, opts: ScrapeOptions, cancel: CancelToken) -> RunReport {
        Pipeline::new(
            pool.clone(),
            Arc::new(fetcher),
            SourceRegistry::with_defaults(30),
            vec![VARNA, RUSE],
            opts,
        )
        .run(cancel)
        .await
        .unwrap()
    }

    async fn snapshot(pool: &SqlitePool) -> Vec<(String, String, f64, f64)> {
        market::all_listings(pool)
            .await
            .unwrap()
            .into_iter()
            .map(|l| (l.city, l.source, l.size_sqm, l.price_eur))
            .collect()
    }

    #[tokio::test]
    async fn success_exports_and_clears_checkpoint() {
        let pool = test_pool().await;
        let stale = MarketListing {
            city: "Варна".to_string(),
            neighborhood: None,
            size_sqm: 65.0,
            price_eur: 65_000.0,
            price_per_sqm: 1000.0,
            rooms: None,
            source: "alo.bg".to_string(),
            scraped_at: Utc::now() - chrono::Duration::days(10),
        };
        upsert_listing(&pool, &stale).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let (_handle, cancel) = cancel_pair();
        let report = run(&pool, full_site(), opts(dir.path(), false, 2), cancel).await;

        assert_eq!(report.state, RunState::Success);
        assert_eq!(report.purged, 1);
        assert_eq!(report.exported, Some(10));
        assert!(report.units.iter().all(|u| u.status == UnitStatus::Succeeded { count: 5 }));
        assert!(dir.path().join("market_listings.json").exists());
        assert!(!CheckpointManager::path_for(dir.path(), date()).exists());
    }

    #[tokio::test]
    async fn one_insufficient_unit_fails_the_run_and_blocks_export() {
        let pool = test_pool().await;
        let fetcher = StubFetcher::new()
            .page(VARNA.url, &five(1500.0))
            .page(RUSE.url, &olx_page(&[(50.0, 900.0), (60.0, 950.0)]));
        let dir = tempfile::tempdir().unwrap();
        let (_handle, cancel) = cancel_pair();
        let report = run(&pool, fetcher, opts(dir.path(), false, 2), cancel).await;

        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.state.exit_code(), 1);
        assert_eq!(report.exported, None);
        assert!(!dir.path().join("market_listings.json").exists());

        let cp = CheckpointManager::load(dir.path(), date()).await;
        let ruse = cp.record("Русе", "olx.bg").unwrap();
        assert!(!ruse.success);
        assert_eq!(ruse.count, 2);
        assert_eq!(ruse.error.as_deref(), Some("Too few listings: 2 < 5 minimum"));
        assert!(cp.record("Варна", "olx.bg").unwrap().success);
    }

    #[tokio::test]
    async fn interrupted_then_resumed_matches_an_uninterrupted_run() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool().await;

        let (handle, cancel) = cancel_pair();
        let first = run(
            &pool,
            full_site().cancel_on(RUSE.url, handle.clone()),
            opts(dir.path(), false, 1),
            cancel,
        )
        .await;
        assert_eq!(first.state, RunState::Interrupted);
        assert_eq!(first.state.exit_code(), 2);
        assert_eq!(first.exported, None);
        assert!(!dir.path().join("market_listings.json").exists());

        let done: Vec<UnitKey> = CheckpointManager::load(dir.path(), date())
            .await
            .completed()
            .map(|(unit, _)| unit)
            .collect();
        assert!(!done.contains(&UnitKey::new("Русе", "olx.bg")));

        let fetcher = full_site();
        let calls = fetcher.calls();
        let (_handle, cancel) = cancel_pair();
        let second = run(&pool, fetcher, opts(dir.path(), true, 1), cancel).await;
        assert_eq!(second.state, RunState::Success);
        assert_eq!(second.exported, Some(10));

        let fetched = calls.lock().unwrap().clone();
        for unit in &done {
            let url = [VARNA, RUSE].iter().find(|t| t.city == unit.city).unwrap().url;
            assert!(!fetched.iter().any(|u| u.starts_with(url)), "{unit} was fetched again");
        }

        let reference_dir = tempfile::tempdir().unwrap();
        let reference = test_pool().await;
        let (_handle, cancel) = cancel_pair();
        let straight = run(&reference, full_site(), opts(reference_dir.path(), false, 1), cancel).await;
        assert_eq!(straight.state, RunState::Success);
        assert_eq!(snapshot(&pool).await, snapshot(&reference).await);
    }

    #[tokio::test]
    async fn fresh_run_discards_todays_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut stale = CheckpointManager::new(dir.path(), date());
        stale.mark_done("Варна", "olx.bg", false, 0, Some("boom".into())).await.unwrap();

        let pool = test_pool().await;
        let fetcher = full_site();
        let calls = fetcher.calls();
        let (_handle, cancel) = cancel_pair();
        let report = run(&pool, fetcher, opts(dir.path(), false, 2), cancel).await;

        assert_eq!(report.state, RunState::Success);
        assert!(calls.lock().unwrap().iter().any(|u| u.starts_with(VARNA.url)));
    }
}
