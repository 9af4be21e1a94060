use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use reqwest::StatusCode;
use tracing::{debug, error, warn};

use crate::config::{Config, FETCH_BACKOFF_BASE, RATE_LIMIT_COOLDOWN, USER_AGENT};
use crate::error::Result;
use crate::shutdown::CancelToken;

/// Result of fetching one URL, retries included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Body(String),
    /// 404: the resource does not exist. Not an error.
    NotFound,
    /// Retries exhausted; carries the last error seen.
    Failed(String),
    /// The cancel token was raised before the fetch could finish.
    Cancelled,
}

impl FetchOutcome {
    pub fn ok(&self) -> bool {
        matches!(self, FetchOutcome::Body(_) | FetchOutcome::NotFound)
    }

    pub fn into_body(self) -> Option<String> {
        match self {
            FetchOutcome::Body(body) => Some(body),
            _ => None,
        }
    }
}

/// Anything that can turn a URL into a page body. The orchestrator only talks
/// to this trait; [`HttpFetcher`] is the production implementation.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        encoding: &str,
        max_retries: u32,
        cancel: &CancelToken,
    ) -> FetchOutcome;
}

#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub timeout: Duration,
    /// Minimum spacing between requests to one host.
    pub min_request_interval: Duration,
    /// First transient-error backoff; doubles per attempt.
    pub backoff_base: Duration,
    /// First 429/403 cooldown; doubles per attempt.
    pub rate_limit_cooldown: Duration,
}

impl FetchPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            timeout: cfg.fetch_timeout,
            min_request_interval: cfg.min_request_interval,
            backoff_base: FETCH_BACKOFF_BASE,
            rate_limit_cooldown: RATE_LIMIT_COOLDOWN,
        }
    }
}

enum Attempt {
    Body(String),
    NotFound,
    Blocked(StatusCode),
    Transient(String),
}

/// Rate-limited HTTP client shared by every scrape worker.
pub struct HttpFetcher {
    client: reqwest::Client,
    policy: FetchPolicy,
    /// host → time of the most recently scheduled request
    last_request: DashMap<String, Instant>,
}

impl HttpFetcher {
    pub fn new(policy: FetchPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(policy.timeout)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            policy,
            last_request: DashMap::new(),
        })
    }

    /// Host part of a URL without a leading `www.`.
    pub fn domain_of(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        Some(host.strip_prefix("www.").unwrap_or(host).to_string())
    }

    pub fn last_request_at(&self, domain: &str) -> Option<Instant> {
        self.last_request.get(domain).map(|t| *t)
    }

    /// Reserve the next request slot for the URL's host. Slots are handed out
    /// under the map entry lock so concurrent workers never share one.
    fn reserve_slot(&self, url: &str) -> Option<Instant> {
        let domain = Self::domain_of(url)?;
        let now = Instant::now();
        let slot = match self.last_request.entry(domain) {
            Entry::Occupied(mut e) => {
                let next = (*e.get() + self.policy.min_request_interval).max(now);
                e.insert(next);
                next
            }
            Entry::Vacant(e) => {
                e.insert(now);
                now
            }
        };
        Some(slot)
    }

    /// Wait for this host's politeness slot. Returns false if cancelled while waiting.
    async fn wait_turn(&self, url: &str, cancel: &CancelToken) -> bool {
        let Some(slot) = self.reserve_slot(url) else {
            return true;
        };
        let wait = slot.saturating_duration_since(Instant::now());
        if wait.is_zero() {
            return true;
        }
        debug!(url, wait_ms = wait.as_millis() as u64, "politeness wait");
        cancel.sleep(wait).await
    }

    async fn attempt(&self, url: &str, encoding: &str) -> Attempt {
        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return Attempt::Transient(e.to_string()),
        };
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Attempt::NotFound;
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
            return Attempt::Blocked(status);
        }
        if !status.is_success() {
            return Attempt::Transient(format!("HTTP {status}"));
        }
        match resp.text_with_charset(encoding).await {
            Ok(body) => Attempt::Body(body),
            Err(e) => Attempt::Transient(e.to_string()),
        }
    }
}

/// `base * 2^attempt`, saturating for large retry counts.
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        encoding: &str,
        max_retries: u32,
        cancel: &CancelToken,
    ) -> FetchOutcome {
        let max_retries = max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_retries {
            if cancel.is_cancelled() {
                return FetchOutcome::Cancelled;
            }
            if !self.wait_turn(url, cancel).await {
                return FetchOutcome::Cancelled;
            }

            let wait = match self.attempt(url, encoding).await {
                Attempt::Body(body) => return FetchOutcome::Body(body),
                Attempt::NotFound => {
                    debug!(url, "404, no data");
                    return FetchOutcome::NotFound;
                }
                Attempt::Blocked(status) => {
                    last_error = format!("blocked (HTTP {})", status.as_u16());
                    let wait = backoff(self.policy.rate_limit_cooldown, attempt);
                    warn!(
                        url,
                        status = status.as_u16(),
                        attempt = attempt + 1,
                        "Rate limited or blocked, cooling down {wait:?} ({}/{max_retries})",
                        attempt + 1,
                    );
                    wait
                }
                Attempt::Transient(e) => {
                    let wait = backoff(self.policy.backoff_base, attempt);
                    warn!(
                        url,
                        attempt = attempt + 1,
                        "Fetch error: {e}, retrying in {wait:?} ({}/{max_retries})",
                        attempt + 1,
                    );
                    last_error = e;
                    wait
                }
            };

            if attempt + 1 < max_retries && !cancel.sleep(wait).await {
                return FetchOutcome::Cancelled;
            }
        }

        error!(url, "Failed after {max_retries} attempts: {last_error}");
        FetchOutcome::Failed(last_error)
    }
}
