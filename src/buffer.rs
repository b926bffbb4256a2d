//! Buffers price observations and writes them in bulk.

use std::collections::HashMap;

use crate::config::{NATURAL_KEY, PRICE_HISTORY_TABLE};
use crate::models::{Outcome, PriceObservation, RunStatistics, SkipReason};
use crate::retry::RetryPolicy;
use crate::store::{Row, Store};

/// Ordered buffer of pending observations with a flush threshold.
#[derive(Debug)]
pub struct WriteBuffer {
    rows: Vec<PriceObservation>,
    threshold: usize,
}

impl WriteBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            rows: Vec::with_capacity(threshold),
            threshold: threshold.max(1),
        }
    }

    pub fn push(&mut self, obs: PriceObservation) {
        self.rows.push(obs);
    }

    pub fn extend(&mut self, obs: impl IntoIterator<Item = PriceObservation>) {
        self.rows.extend(obs);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.threshold
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Take everything buffered, collapsing rows that share a natural key.
    ///
    /// The last observation for a key wins and keeps its first position, so
    /// a single bulk upsert never touches the same row twice.
    pub fn drain_dedup(&mut self) -> Vec<PriceObservation> {
        let rows = std::mem::take(&mut self.rows);
        let mut out: Vec<PriceObservation> = Vec::with_capacity(rows.len());
        let mut index: HashMap<(String, String, String, &'static str), usize> = HashMap::new();
        for obs in rows {
            let key = (
                obs.card_id.as_str().to_string(),
                obs.source.clone(),
                obs.scraped_at.clone(),
                obs.price_type.as_str(),
            );
            match index.get(&key) {
                Some(&i) => out[i] = obs,
                None => {
                    index.insert(key, out.len());
                    out.push(obs);
                }
            }
        }
        out
    }
}

/// Write the buffer to `price_history` and empty it.
///
/// In a dry run the rows are counted as inserted without touching the store,
/// keeping statistics identical to a real run. When every retry fails the
/// batch is dropped and counted; the error never leaves this function.
pub fn flush_buffer<S: Store + ?Sized>(
    store: &mut S,
    buffer: &mut WriteBuffer,
    retry: &RetryPolicy,
    stats: &mut RunStatistics,
    dry_run: bool,
) -> Outcome {
    if buffer.is_empty() {
        return Outcome::Skipped(SkipReason::Empty);
    }

    let batch = buffer.drain_dedup();
    let count = batch.len() as u64;
    stats.flushes += 1;

    if dry_run {
        stats.prices_inserted += count;
        return Outcome::Recorded;
    }

    let rows: Vec<Row> = batch.iter().map(PriceObservation::to_row).collect();
    match retry.run("flush_price_buffer", store, stats, |s| {
        s.upsert(PRICE_HISTORY_TABLE, &rows, NATURAL_KEY)
    }) {
        Ok(_) => {
            stats.prices_inserted += count;
            tracing::debug!(rows = count, "flushed price buffer");
            Outcome::Recorded
        }
        Err(e) => {
            stats.failed_flushes += 1;
            stats.prices_dropped += count;
            tracing::error!(rows = count, error = %e, "dropping price batch after failed flush");
            Outcome::Failed(e.to_string())
        }
    }
}
