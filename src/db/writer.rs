use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::config::CHANNEL_CAPACITY;
use crate::db::market::upsert_listing;
use crate::error::{AppError, Result};
use crate::types::{MarketListing, UnitKey};

/// All listings one unit produced, flushed as a single transaction.
pub struct UnitBatch {
    pub unit: UnitKey,
    pub listings: Vec<MarketListing>,
    /// Receives the number of rows saved once the batch is committed.
    pub ack: oneshot::Sender<Result<usize>>,
}

/// Owns every market-listing write. Workers hand it finished unit batches over
/// a channel and wait for the acknowledgement.
pub struct DbWriter {
    pool: sqlx::SqlitePool,
    batch_rx: mpsc::Receiver<UnitBatch>,
}

/// Cloneable sending side of the writer channel.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<UnitBatch>,
}

impl DbWriter {
    pub fn new(pool: sqlx::SqlitePool, batch_rx: mpsc::Receiver<UnitBatch>) -> Self {
        Self { pool, batch_rx }
    }

    /// Writer plus its handle, with the standard channel capacity.
    pub fn channel(pool: sqlx::SqlitePool) -> (Self, WriterHandle) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (Self::new(pool, rx), WriterHandle { tx })
    }

    /// Runs until every handle is dropped.
    pub async fn run(mut self) {
        while let Some(batch) = self.batch_rx.recv().await {
            let result = self.write_batch(&batch.unit, &batch.listings).await;
            if let Err(e) = &result {
                error!(unit = %batch.unit, "DB write error: {e}");
            }
            if batch.ack.send(result).is_err() {
                warn!(unit = %batch.unit, "Batch submitter went away before the ack");
            }
        }
        debug!("DB writer stopped");
    }

    async fn write_batch(&self, unit: &UnitKey, listings: &[MarketListing]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut saved = 0;
        for l in listings {
            match upsert_listing(&mut *tx, l).await {
                Ok(()) => saved += 1,
                Err(e) => warn!(
                    unit = %unit,
                    size_sqm = l.size_sqm,
                    price_eur = l.price_eur,
                    "Skipping listing, write failed: {e}"
                ),
            }
        }
        tx.commit().await?;
        Ok(saved)
    }
}

impl WriterHandle {
    /// Submit one unit's listings and wait until they are committed.
    pub async fn save(&self, unit: UnitKey, listings: Vec<MarketListing>) -> Result<usize> {
        if listings.is_empty() {
            return Ok(0);
        }
        let (ack, done) = oneshot::channel();
        self.tx
            .send(UnitBatch { unit, listings, ack })
            .await
            .map_err(|e| AppError::ChannelSend(e.to_string()))?;
        done.await
            .map_err(|e| AppError::ChannelSend(format!("writer dropped the batch: {e}")))?
    }
}
