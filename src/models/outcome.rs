use std::fmt;

// ---------------------------------------------------------------------------
// Outcome — What a pipeline stage did with its input
// ---------------------------------------------------------------------------

/// Result of a stage whose failure must not stop the run.
///
/// Stages return an `Outcome` instead of swallowing errors, and the driver
/// tallies it into [`RunStatistics`](crate::models::RunStatistics).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Recorded,
    Skipped(SkipReason),
    Failed(String),
}

impl Outcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Outcome::Recorded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Feed key was neither 32 nor 36 characters.
    InvalidIdentifier,
    /// No local variant carries the UUID.
    Unmatched,
    /// Entry has no block for the configured provider.
    NoPriceData,
    /// Nothing to write (empty buffer, no observations for the variant).
    Empty,
    /// Every observed date is older than what the card already shows.
    NothingNewer,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::InvalidIdentifier => "invalid identifier",
            SkipReason::Unmatched => "unmatched",
            SkipReason::NoPriceData => "no price data",
            SkipReason::Empty => "empty",
            SkipReason::NothingNewer => "nothing newer",
        };
        f.write_str(s)
    }
}
