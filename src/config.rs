//! Constants and the run configuration.
//!
//! A [`SyncConfig`] is built once at startup (from the environment, CLI
//! flags, or directly in tests) and handed to every stage of the pipeline.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SyncError};

pub const CDN_BASE: &str = "https://mtgjson.com/api/v5";
pub const META_URL: &str = "https://mtgjson.com/api/v5/Meta.json";
pub const DEFAULT_FX_URL: &str = "https://api.exchangerate.host";

/// Table holding one row per card variant.
pub const CARDS_TABLE: &str = "cards";
/// Append-only price observation log.
pub const PRICE_HISTORY_TABLE: &str = "price_history";
/// Uniqueness constraint of `price_history`, used as the upsert conflict target.
pub const NATURAL_KEY: &[&str] = &["card_id", "source", "scraped_at", "price_type"];

pub const DEFAULT_SOURCE: &str = "CardKingdom";
pub const DEFAULT_PROVIDER: &str = "cardkingdom";
pub const FEED_CURRENCY: &str = "USD";

pub const DEFAULT_FIXED_RATE: f64 = 5.50;
/// Fixed markup added to every converted price, in BRL.
pub const FLAT_FEE_BRL: f64 = 0.30;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_PROGRESS_EVERY: usize = 1000;
pub const DEFAULT_REFRESH_EVERY: usize = 5000;
/// Page size for paged selects; PostgREST caps responses at 1000 rows by default.
pub const SELECT_PAGE_SIZE: usize = 1000;

/// The two MTGJSON price documents this tool understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    /// Full 90-day history.
    AllPrices,
    /// Only the most recent day.
    AllPricesToday,
}

impl FeedKind {
    pub fn file_name(self) -> &'static str {
        match self {
            FeedKind::AllPrices => "AllPrices.json.gz",
            FeedKind::AllPricesToday => "AllPricesToday.json.gz",
        }
    }
}

/// Which dates of each series are imported, and at which rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportMode {
    /// Every date in the feed, converted at the fixed rate.
    History,
    /// Only `date`, converted at the day's looked-up rate.
    Daily { date: String },
}

/// How card variants are resolved from a feed UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Load the whole `cards` table up front.
    Preload,
    /// Fetch each UUID on first use.
    Lazy,
}

/// Endpoint and key for the hosted store.
#[derive(Debug, Clone)]
pub struct StoreCredentials {
    pub url: String,
    pub key: String,
}

impl StoreCredentials {
    /// Read credentials from the environment.
    ///
    /// Accepts both the backend names (`SUPABASE_URL`,
    /// `SUPABASE_SERVICE_ROLE_KEY`) and the frontend ones (`VITE_*`); the
    /// service role key wins over the anon key.
    pub fn from_env() -> Result<Self> {
        let url = first_var(&["SUPABASE_URL", "VITE_SUPABASE_URL"])
            .ok_or_else(|| SyncError::Config("SUPABASE_URL is not set".to_string()))?;
        let key = first_var(&["SUPABASE_SERVICE_ROLE_KEY", "VITE_SUPABASE_ANON_KEY"])
            .ok_or_else(|| SyncError::Config("SUPABASE_SERVICE_ROLE_KEY is not set".to_string()))?;
        Ok(Self { url, key })
    }
}

fn first_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| env::var(n).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Run configuration for one import or reconcile job.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub mode: ImportMode,
    pub feed_path: Option<PathBuf>,
    pub dry_run: bool,
    pub max_cards: Option<usize>,
    pub batch_size: usize,
    pub fixed_rate: f64,
    pub source: String,
    pub provider: String,
    pub match_strategy: MatchStrategy,
    pub project_latest: bool,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub progress_every: usize,
    pub refresh_every: usize,
    pub fx_url: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: ImportMode::History,
            feed_path: None,
            dry_run: false,
            max_cards: None,
            batch_size: DEFAULT_BATCH_SIZE,
            fixed_rate: DEFAULT_FIXED_RATE,
            source: DEFAULT_SOURCE.to_string(),
            provider: DEFAULT_PROVIDER.to_string(),
            match_strategy: MatchStrategy::Preload,
            project_latest: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_DELAY,
            progress_every: DEFAULT_PROGRESS_EVERY,
            refresh_every: DEFAULT_REFRESH_EVERY,
            fx_url: DEFAULT_FX_URL.to_string(),
        }
    }
}

impl SyncConfig {
    /// Start from defaults and apply `DRY_RUN`, `MAX_CARDS`, `BATCH_SIZE`,
    /// `FIXED_RATE`, `PRICES_FILE` and `FX_URL` from the environment.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// Malformed numeric values are a configuration error rather than being
    /// silently ignored.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = SyncConfig::default();

        if let Ok(v) = env::var("DRY_RUN") {
            cfg.dry_run = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = env::var("MAX_CARDS") {
            let n: usize = parse_var("MAX_CARDS", &v)?;
            cfg.max_cards = (n > 0).then_some(n);
        }
        if let Ok(v) = env::var("BATCH_SIZE") {
            cfg.batch_size = parse_var("BATCH_SIZE", &v)?;
        }
        if let Ok(v) = env::var("FIXED_RATE") {
            cfg.fixed_rate = parse_var("FIXED_RATE", &v)?;
        }
        if let Ok(v) = env::var("PRICES_FILE") {
            cfg.feed_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = env::var("FX_URL") {
            cfg.fx_url = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn mode(mut self, mode: ImportMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn feed_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.feed_path = Some(path.into());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn max_cards(mut self, max_cards: Option<usize>) -> Self {
        self.max_cards = max_cards;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn fixed_rate(mut self, rate: f64) -> Self {
        self.fixed_rate = rate;
        self
    }

    pub fn match_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.match_strategy = strategy;
        self
    }

    pub fn project_latest(mut self, enabled: bool) -> Self {
        self.project_latest = enabled;
        self
    }

    /// Retry settings for store writes and lookups.
    ///
    /// `base_delay` is multiplied by the attempt number, so a zero delay
    /// disables sleeping entirely (useful in tests).
    pub fn retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn progress_every(mut self, n: usize) -> Self {
        self.progress_every = n;
        self
    }

    pub fn refresh_every(mut self, n: usize) -> Self {
        self.refresh_every = n;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch size must be at least 1".to_string()));
        }
        if self.max_retries == 0 {
            return Err(SyncError::Config("max retries must be at least 1".to_string()));
        }
        if !(self.fixed_rate.is_finite() && self.fixed_rate > 0.0) {
            return Err(SyncError::Config(format!(
                "fixed rate must be a positive number, got {}",
                self.fixed_rate
            )));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SyncError::Config(format!("{} has an invalid value: '{}'", name, value)))
}

pub fn default_cache_dir() -> PathBuf {
    if let Some(cache) = dirs::cache_dir() {
        cache.join("mtg-price-sync")
    } else {
        PathBuf::from(".mtg-price-sync-cache")
    }
}
