//! In-memory page fetcher for pipeline tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::fetcher::{FetchOutcome, PageFetcher};
use crate::shutdown::{CancelHandle, CancelToken};

#[derive(Default)]
pub(crate) struct StubFetcher {
    pages: HashMap<String, String>,
    cancel_on: HashMap<String, CancelHandle>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StubFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    /// Raise `handle` when `url` is requested, as a signal would mid-fetch.
    pub(crate) fn cancel_on(mut self, url: &str, handle: CancelHandle) -> Self {
        self.cancel_on.insert(url.to_string(), handle);
        self
    }

    pub(crate) fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str, _encoding: &str, _max_retries: u32, cancel: &CancelToken) -> FetchOutcome {
        if cancel.is_cancelled() {
            return FetchOutcome::Cancelled;
        }
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(handle) = self.cancel_on.get(url) {
            handle.cancel();
            return FetchOutcome::Cancelled;
        }
        match self.pages.get(url) {
            Some(body) => FetchOutcome::Body(body.clone()),
            None => FetchOutcome::NotFound,
        }
    }
}

/// A plain olx.bg-style results page, one "NN кв.м - RATE" line per listing.
pub(crate) fn olx_page(listings: &[(f64, f64)]) -> String {
    let rows: String = listings
        .iter()
        .map(|(size, rate)| format!("<p>{size} кв.м - {rate}</p>"))
        .collect();
    format!("<html><body>{rows}</body></html>")
}
