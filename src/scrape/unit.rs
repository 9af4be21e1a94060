use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::UnitTarget;
use crate::db::writer::WriterHandle;
use crate::fetcher::{FetchOutcome, PageFetcher};
use crate::scrape::{UnitReport, UnitStatus};
use crate::shutdown::CancelToken;
use crate::sources::{Crawl, SourceParser, SourceRegistry};
use crate::types::{MarketListing, UnitKey};

/// Everything a worker needs to scrape one unit. Shared across workers.
pub struct UnitContext {
    pub fetcher: Arc<dyn PageFetcher>,
    pub registry: SourceRegistry,
    pub writer: WriterHandle,
    pub cancel: CancelToken,
    pub max_retries: u32,
    pub min_listings: usize,
}

/// What the crawl of one unit produced before persistence.
#[derive(Default)]
struct Harvest {
    listings: Vec<MarketListing>,
    seen: HashSet<(u64, u64)>,
    failure: Option<String>,
    interrupted: bool,
}

impl Harvest {
    /// Same (size, price) twice within a unit is one listing.
    fn extend(&mut self, found: Vec<MarketListing>) {
        for l in found {
            if self.seen.insert((l.size_sqm.to_bits(), l.price_eur.to_bits())) {
                self.listings.push(l);
            }
        }
    }

    fn parse_page(&mut self, parser: &dyn SourceParser, url: &str, body: &str, city: &str) {
        match parser.parse(body, city) {
            Ok(found) => {
                debug!(url, listings = found.len(), "Page parsed");
                self.extend(found);
            }
            Err(e) => warn!(url, "Page dropped: {e}"),
        }
    }
}

/// Fetch, parse and persist one unit. Never returns an error: every problem
/// ends up in the report status.
pub async fn scrape_unit(ctx: &UnitContext, target: UnitTarget) -> UnitReport {
    let unit = UnitKey::new(target.city, target.source);
    let Some(parser) = ctx.registry.get(target.source) else {
        return UnitReport {
            unit,
            status: UnitStatus::Failed {
                count: 0,
                error: format!("No parser registered for {}", target.source),
            },
        };
    };

    info!(unit = %unit, "Scraping unit");
    let harvest = match parser.crawl() {
        Crawl::Pages => crawl_pages(ctx, parser.as_ref(), &target).await,
        Crawl::IndexThenDetails => crawl_index(ctx, parser.as_ref(), &target).await,
    };
    let found = harvest.listings.len();

    let count = match ctx.writer.save(unit.clone(), harvest.listings).await {
        Ok(n) => n,
        Err(e) => {
            return UnitReport {
                unit,
                status: UnitStatus::Failed { count: 0, error: format!("Listing write failed: {e}") },
            };
        }
    };
    debug!(unit = %unit, found, saved = count, "Unit persisted");

    let status = if harvest.interrupted {
        UnitStatus::Interrupted { count }
    } else if let Some(error) = harvest.failure {
        UnitStatus::Failed { count, error }
    } else if count < ctx.min_listings {
        UnitStatus::Failed {
            count,
            error: format!("Too few listings: {count} < {} minimum", ctx.min_listings),
        }
    } else {
        UnitStatus::Succeeded { count }
    };
    UnitReport { unit, status }
}

async fn crawl_pages(ctx: &UnitContext, parser: &dyn SourceParser, target: &UnitTarget) -> Harvest {
    let mut harvest = Harvest::default();
    for (i, url) in parser.page_urls(target.url).iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            harvest.interrupted = true;
            break;
        }
        match ctx
            .fetcher
            .fetch(url, parser.encoding(), ctx.max_retries, &ctx.cancel)
            .await
        {
            FetchOutcome::Body(body) => harvest.parse_page(parser, url, &body, target.city),
            FetchOutcome::NotFound if i == 0 => {
                harvest.failure = Some(format!("First page not found: {url}"));
                break;
            }
            // Past the last page.
            FetchOutcome::NotFound => break,
            FetchOutcome::Failed(e) if i == 0 => {
                harvest.failure = Some(format!("Failed to fetch {url}: {e}"));
                break;
            }
            FetchOutcome::Failed(e) => {
                warn!(url, "Stopping pagination: {e}");
                break;
            }
            FetchOutcome::Cancelled => {
                harvest.interrupted = true;
                break;
            }
        }
    }
    harvest
}

async fn crawl_index(ctx: &UnitContext, parser: &dyn SourceParser, target: &UnitTarget) -> Harvest {
    let mut harvest = Harvest::default();
    let encoding = parser.encoding();

    let details = match ctx
        .fetcher
        .fetch(target.url, encoding, ctx.max_retries, &ctx.cancel)
        .await
    {
        FetchOutcome::Body(body) => parser.detail_urls(&body),
        FetchOutcome::NotFound => {
            harvest.failure = Some(format!("Index page not found: {}", target.url));
            return harvest;
        }
        FetchOutcome::Failed(e) => {
            harvest.failure = Some(format!("Failed to fetch {}: {e}", target.url));
            return harvest;
        }
        FetchOutcome::Cancelled => {
            harvest.interrupted = true;
            return harvest;
        }
    };
    if details.is_empty() {
        harvest.failure = Some(format!("No listing links on {}", target.url));
        return harvest;
    }
    debug!(url = target.url, links = details.len(), "Index parsed");

    for url in &details {
        if ctx.cancel.is_cancelled() {
            harvest.interrupted = true;
            break;
        }
        match ctx.fetcher.fetch(url, encoding, ctx.max_retries, &ctx.cancel).await {
            FetchOutcome::Body(body) => harvest.parse_page(parser, url, &body, target.city),
            FetchOutcome::NotFound => debug!(url, "Listing gone"),
            FetchOutcome::Failed(e) => warn!(url, "Listing skipped: {e}"),
            FetchOutcome::Cancelled => {
                harvest.interrupted = true;
                break;
            }
        }
    }
    harvest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::market;
    use crate::db::test_pool;
    use crate::db::writer::DbWriter;
    use crate::scrape::testing::{olx_page, StubFetcher};
    use crate::shutdown::cancel_pair;

    async fn context(fetcher: StubFetcher, pool: &sqlx::SqlitePool) -> (UnitContext, crate::shutdown::CancelHandle) {
        let (writer, handle) = DbWriter::channel(pool.clone());
        tokio::spawn(writer.run());
        let (cancel_handle, cancel) = cancel_pair();
        let ctx = UnitContext {
            fetcher: Arc::new(fetcher),
            registry: SourceRegistry::with_defaults(30),
            writer: handle,
            cancel,
            max_retries: 1,
            min_listings: 5,
        };
        (ctx, cancel_handle)
    }

    const VARNA: UnitTarget = UnitTarget { city: "Варна", source: "olx.bg", url: "http://stub/varna" };

    #[tokio::test]
    async fn pages_are_walked_until_not_found() {
        let pool = test_pool().await;
        let fetcher = StubFetcher::new()
            .page("http://stub/varna", &olx_page(&[(50.0, 1500.0), (60.0, 1600.0), (70.0, 1700.0)]))
            .page("http://stub/varna?page=2", &olx_page(&[(80.0, 1800.0), (90.0, 1900.0), (50.0, 1500.0)]));
        let (ctx, _h) = context(fetcher, &pool).await;

        let report = scrape_unit(&ctx, VARNA).await;
        assert_eq!(report.status, UnitStatus::Succeeded { count: 5 });
        assert_eq!(market::count(&pool).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn too_few_listings_fail_but_are_kept() {
        let pool = test_pool().await;
        let fetcher = StubFetcher::new().page("http://stub/varna", &olx_page(&[(50.0, 1500.0), (60.0, 1600.0)]));
        let (ctx, _h) = context(fetcher, &pool).await;

        let report = scrape_unit(&ctx, VARNA).await;
        assert_eq!(
            report.status,
            UnitStatus::Failed { count: 2, error: "Too few listings: 2 < 5 minimum".to_string() }
        );
        assert_eq!(market::count(&pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn missing_first_page_fails_the_unit() {
        let pool = test_pool().await;
        let (ctx, _h) = context(StubFetcher::new(), &pool).await;
        let report = scrape_unit(&ctx, VARNA).await;
        assert!(matches!(report.status, UnitStatus::Failed { count: 0, .. }));
    }

    #[tokio::test]
    async fn unknown_source_fails_without_fetching() {
        let pool = test_pool().await;
        let fetcher = StubFetcher::new();
        let calls = fetcher.calls();
        let (ctx, _h) = context(fetcher, &pool).await;
        let target = UnitTarget { city: "Варна", source: "example.bg", url: "http://stub/x" };
        let report = scrape_unit(&ctx, target).await;
        assert!(report.status.is_failure());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_keeps_partial_listings() {
        let pool = test_pool().await;
        let (cancel_handle, _) = cancel_pair();
        let fetcher = StubFetcher::new()
            .page("http://stub/varna", &olx_page(&[(50.0, 1500.0), (60.0, 1600.0), (70.0, 1700.0)]))
            .cancel_on("http://stub/varna?page=2", cancel_handle.clone());
        let (writer, handle) = DbWriter::channel(pool.clone());
        tokio::spawn(writer.run());
        let ctx = UnitContext {
            fetcher: Arc::new(fetcher),
            registry: SourceRegistry::with_defaults(30),
            writer: handle,
            cancel: cancel_handle.token(),
            max_retries: 1,
            min_listings: 5,
        };

        let report = scrape_unit(&ctx, VARNA).await;
        assert_eq!(report.status, UnitStatus::Interrupted { count: 3 });
        assert_eq!(market::count(&pool).await.unwrap(), 3);
    }
}
