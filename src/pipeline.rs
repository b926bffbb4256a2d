//! The batch driver: walks the feed and runs every stage per entry.
//!
//! [`PriceSync`] owns all run state (store, matcher, buffer, FX resolver,
//! statistics) and passes it explicitly to each stage. Processing is
//! sequential and blocking.

use std::time::Instant;

use serde_json::Value;

use crate::buffer::{flush_buffer, WriteBuffer};
use crate::builder::build_series;
use crate::config::{ImportMode, MatchStrategy, SyncConfig};
use crate::error::Result;
use crate::feed::{provider_prices, PriceFeed};
use crate::fx::FxResolver;
use crate::matcher::VariantMatcher;
use crate::models::{LatestPrice, Outcome, PriceType, RunStatistics, SkipReason};
use crate::projector::{apply_projection, plan_projection};
use crate::reconcile::{reconcile_latest, ReconcileReport};
use crate::retry::RetryPolicy;
use crate::store::Store;
use crate::uuid::normalize_uuid;

pub struct PriceSync<S: Store> {
    store: S,
    config: SyncConfig,
    matcher: VariantMatcher,
    buffer: WriteBuffer,
    retry: RetryPolicy,
    fx: Box<dyn FxResolver>,
    stats: RunStatistics,
}

impl<S: Store> PriceSync<S> {
    pub fn new(store: S, config: SyncConfig, fx: Box<dyn FxResolver>) -> Self {
        let retry = RetryPolicy::new(config.max_retries, config.retry_base_delay);
        let buffer = WriteBuffer::new(config.batch_size);
        let matcher = VariantMatcher::lazy(&config.source);
        Self {
            store,
            config,
            matcher,
            buffer,
            retry,
            fx,
            stats: RunStatistics::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn stats(&self) -> &RunStatistics {
        &self.stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Observations waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Preload the variant table when the preload strategy is configured.
    ///
    /// Idempotent; [`run`](Self::run) calls it. A failed preload is fatal.
    pub fn prepare(&mut self) -> Result<()> {
        if self.config.match_strategy == MatchStrategy::Preload && !self.matcher.is_preloaded() {
            self.matcher = VariantMatcher::preload(
                &mut self.store,
                &self.retry,
                &mut self.stats,
                &self.config.source,
            )?;
        }
        Ok(())
    }

    /// Process every feed entry, drain the buffer, and return the statistics.
    pub fn run(&mut self, feed: &PriceFeed) -> Result<RunStatistics> {
        self.prepare()?;

        let total = feed.len();
        let start = Instant::now();
        tracing::info!(
            entries = total,
            dry_run = self.config.dry_run,
            max_cards = ?self.config.max_cards,
            mode = ?self.config.mode,
            "starting price import"
        );

        for (i, (key, entry)) in feed.entries().enumerate() {
            if let Some(max) = self.config.max_cards {
                if self.stats.entries_processed >= max as u64 {
                    tracing::info!(max, "reached max cards limit");
                    break;
                }
            }

            let outcome = self.process_entry(key, entry);
            self.stats.tally_entry(&outcome);

            let done = i + 1;
            if self.config.progress_every > 0 && done % self.config.progress_every == 0 {
                self.log_progress(done, total, start);
            }
            if self.config.refresh_every > 0 && done % self.config.refresh_every == 0 {
                self.refresh_client();
            }
        }

        self.finish();
        self.stats.fx_fetched = self.fx.lookups();

        tracing::info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            "price import complete\n{}",
            self.stats
        );
        Ok(self.stats.clone())
    }

    /// Handle one feed entry: normalize, match, build, buffer, project.
    ///
    /// Never fails; the returned outcome says what happened. Entry-level
    /// counters are left to the caller (see [`RunStatistics::tally_entry`]).
    pub fn process_entry(&mut self, key: &str, entry: &Value) -> Outcome {
        let uuid = match normalize_uuid(key) {
            Ok(uuid) => uuid,
            Err(e) => {
                tracing::debug!(key, error = %e, "skipping entry");
                return Outcome::Skipped(SkipReason::InvalidIdentifier);
            }
        };

        let variants = match self
            .matcher
            .lookup(&mut self.store, &self.retry, &mut self.stats, &uuid)
        {
            Ok(variants) => variants,
            Err(e) => {
                tracing::warn!(%uuid, error = %e, "card lookup failed, skipping entry");
                return Outcome::Failed(e.to_string());
            }
        };
        if variants.is_empty() {
            return Outcome::Skipped(SkipReason::Unmatched);
        }

        let Some(prices) = provider_prices(entry, &self.config.provider) else {
            return Outcome::Skipped(SkipReason::NoPriceData);
        };

        let only_date = match &self.config.mode {
            ImportMode::History => None,
            ImportMode::Daily { date } => Some(date.clone()),
        };

        for variant in &variants {
            let finish = variant.finish();
            let mut buy: Option<LatestPrice> = None;
            let mut sell: Option<LatestPrice> = None;

            for price_type in [PriceType::Buy, PriceType::Sell] {
                let Some(series) = prices.series(price_type, finish) else {
                    continue;
                };
                let built = build_series(
                    &variant.id,
                    &self.config.source,
                    price_type,
                    series,
                    self.fx.as_mut(),
                    only_date.as_deref(),
                );
                self.stats.values_skipped += built.skipped as u64;
                self.stats.prices_queued += built.observations.len() as u64;
                self.buffer.extend(built.observations);
                match price_type {
                    PriceType::Buy => buy = built.latest,
                    PriceType::Sell => sell = built.latest,
                }
            }

            if self.buffer.is_full() {
                self.flush();
            }

            if self.config.project_latest {
                match plan_projection(variant, buy.as_ref(), sell.as_ref()) {
                    Ok(projection) => {
                        let outcome = apply_projection(&mut self.store, &projection, self.config.dry_run);
                        if outcome.is_recorded() {
                            self.matcher.note_projection(&uuid, &projection);
                        }
                        self.stats.tally_projection(&outcome);
                    }
                    Err(SkipReason::Empty) => {}
                    Err(reason) => self.stats.tally_projection(&Outcome::Skipped(reason)),
                }
            }
        }

        Outcome::Recorded
    }

    /// Flush whatever is buffered now.
    pub fn flush(&mut self) -> Outcome {
        flush_buffer(
            &mut self.store,
            &mut self.buffer,
            &self.retry,
            &mut self.stats,
            self.config.dry_run,
        )
    }

    /// Final drain at the end of a run.
    pub fn finish(&mut self) -> Outcome {
        let outcome = self.flush();
        if let Outcome::Failed(reason) = &outcome {
            tracing::error!(%reason, "final flush failed");
        }
        outcome
    }

    /// Rebuild latest prices on `cards` from the observation log.
    pub fn reconcile(&mut self) -> Result<ReconcileReport> {
        reconcile_latest(
            &mut self.store,
            &self.config.source,
            &self.retry,
            &mut self.stats,
            self.config.dry_run,
        )
    }

    /// Periodic preventive client rebuild.
    fn refresh_client(&mut self) {
        match self.store.reconnect() {
            Ok(()) => {
                self.stats.reconnects += 1;
                tracing::debug!("refreshed store client");
            }
            Err(e) => tracing::warn!(error = %e, "periodic client refresh failed"),
        }
    }

    fn log_progress(&self, done: usize, total: usize, start: Instant) {
        let elapsed = start.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { done as f64 / elapsed } else { 0.0 };
        let pct = if total > 0 { done as f64 / total as f64 * 100.0 } else { 100.0 };
        let eta_min = if rate > 0.0 {
            total.saturating_sub(done) as f64 / rate / 60.0
        } else {
            0.0
        };
        tracing::info!(
            done,
            total,
            pct = %format!("{:.1}", pct),
            rate = %format!("{:.1}", rate),
            eta_min = %format!("{:.0}", eta_min),
            inserted = self.stats.prices_inserted,
            unmatched = self.stats.unmatched,
            lookups_failed = self.stats.lookups_failed,
            no_price = self.stats.no_price,
            retries = self.stats.retries,
            "import progress"
        );
    }
}
