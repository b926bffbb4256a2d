use std::fmt;

use crate::models::{Outcome, SkipReason};

// ---------------------------------------------------------------------------
// RunStatistics — Process-scoped counters for one run
// ---------------------------------------------------------------------------

/// Counters for a single import run, reported at the end and never persisted.
///
/// Run health is judged from `unmatched`, `no_price`, `lookups_failed`,
/// `retries` and `prices_dropped`; there is no separate success/failure flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatistics {
    /// Feed entries visited (including skipped ones).
    pub entries_processed: u64,
    pub prices_queued: u64,
    pub prices_inserted: u64,
    /// Rows lost to flushes that exhausted their retries.
    pub prices_dropped: u64,
    /// Non-numeric feed values that were ignored.
    pub values_skipped: u64,
    pub cards_updated: u64,
    pub projections_skipped: u64,
    pub projections_failed: u64,
    pub unmatched: u64,
    pub no_price: u64,
    pub invalid_ids: u64,
    /// Entries abandoned because the card lookup failed after its retries.
    pub lookups_failed: u64,
    pub retries: u64,
    pub flushes: u64,
    pub failed_flushes: u64,
    pub reconnects: u64,
    pub fx_fetched: u64,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count the outcome of handling one feed entry.
    pub fn tally_entry(&mut self, outcome: &Outcome) {
        self.entries_processed += 1;
        match outcome {
            Outcome::Recorded => {}
            Outcome::Skipped(SkipReason::InvalidIdentifier) => self.invalid_ids += 1,
            Outcome::Skipped(SkipReason::Unmatched) => self.unmatched += 1,
            Outcome::Skipped(SkipReason::NoPriceData) => self.no_price += 1,
            Outcome::Skipped(SkipReason::Empty | SkipReason::NothingNewer) => {}
            Outcome::Failed(_) => self.lookups_failed += 1,
        }
    }

    /// Count the outcome of a latest-price projection.
    pub fn tally_projection(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Recorded => self.cards_updated += 1,
            Outcome::Skipped(_) => self.projections_skipped += 1,
            Outcome::Failed(_) => self.projections_failed += 1,
        }
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Entries processed:   {}", self.entries_processed)?;
        writeln!(f, "Prices queued:       {}", self.prices_queued)?;
        writeln!(f, "Prices inserted:     {}", self.prices_inserted)?;
        writeln!(f, "Prices dropped:      {}", self.prices_dropped)?;
        writeln!(f, "Values skipped:      {}", self.values_skipped)?;
        writeln!(f, "Cards updated:       {}", self.cards_updated)?;
        writeln!(
            f,
            "Projections:         {} skipped, {} failed",
            self.projections_skipped, self.projections_failed
        )?;
        writeln!(f, "Unmatched:           {}", self.unmatched)?;
        writeln!(f, "No price:            {}", self.no_price)?;
        writeln!(f, "Invalid ids:         {}", self.invalid_ids)?;
        writeln!(f, "Lookups failed:      {}", self.lookups_failed)?;
        writeln!(
            f,
            "Flushes:             {} ({} failed)",
            self.flushes, self.failed_flushes
        )?;
        writeln!(f, "Retries:             {}", self.retries)?;
        writeln!(f, "Reconnects:          {}", self.reconnects)?;
        write!(f, "FX rates fetched:    {}", self.fx_fetched)
    }
}
