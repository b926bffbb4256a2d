//! USD to BRL conversion rates.
//!
//! Two policies exist. Bulk history imports use [`FixedRate`] and trade
//! historical accuracy for throughput. Daily imports use [`DailyRate`], which
//! makes a single best-effort lookup per run and falls back to a constant on
//! any failure.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;

use crate::config::ImportMode;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Supplies a USD to local-currency multiplier for a given ISO date.
pub trait FxResolver {
    fn rate_for(&mut self, date: &str) -> f64;

    /// Successful external lookups made so far.
    fn lookups(&self) -> u64 {
        0
    }
}

/// Pick the resolver for an import mode.
///
/// History imports get [`FixedRate`]; daily imports look up the day's rate
/// once, falling back to `fixed_rate`.
pub fn resolver_for(mode: &ImportMode, fixed_rate: f64, fx_url: &str) -> Box<dyn FxResolver> {
    match mode {
        ImportMode::History => Box::new(FixedRate::new(fixed_rate)),
        ImportMode::Daily { date } => match Client::builder().timeout(LOOKUP_TIMEOUT).build() {
            Ok(client) => Box::new(DailyRate::fetch(&client, fx_url, date, fixed_rate)),
            Err(e) => {
                tracing::warn!(error = %e, "could not build HTTP client for rate lookup, using fallback");
                Box::new(DailyRate::with_rate(date, fixed_rate, false))
            }
        },
    }
}

// ---------------------------------------------------------------------------
// FixedRate
// ---------------------------------------------------------------------------

/// Same constant for every date, memoized per date.
#[derive(Debug, Clone)]
pub struct FixedRate {
    rate: f64,
    cache: HashMap<String, f64>,
}

impl FixedRate {
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            cache: HashMap::new(),
        }
    }

    /// Number of distinct dates resolved so far.
    pub fn cached_dates(&self) -> usize {
        self.cache.len()
    }
}

impl FxResolver for FixedRate {
    fn rate_for(&mut self, date: &str) -> f64 {
        if let Some(rate) = self.cache.get(date) {
            return *rate;
        }
        self.cache.insert(date.to_string(), self.rate);
        self.rate
    }
}

// ---------------------------------------------------------------------------
// DailyRate
// ---------------------------------------------------------------------------

/// One rate for the whole run, looked up once at startup.
#[derive(Debug, Clone)]
pub struct DailyRate {
    date: String,
    rate: f64,
    fetched: bool,
}

impl DailyRate {
    /// Look up the rate for `date` from `base_url`, never failing.
    ///
    /// Requests `{base_url}/{date}?base=USD&symbols=BRL`. Network errors,
    /// non-2xx responses, unparseable bodies and missing fields all yield
    /// `fallback`.
    pub fn fetch(client: &Client, base_url: &str, date: &str, fallback: f64) -> Self {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), date);
        let looked_up = client
            .get(&url)
            .query(&[("base", "USD"), ("symbols", "BRL")])
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json::<Value>());

        match looked_up.map(|body| parse_rate(&body)) {
            Ok(Some(rate)) => {
                tracing::info!(date, rate, "fetched daily USD/BRL rate");
                Self::with_rate(date, rate, true)
            }
            Ok(None) => {
                tracing::warn!(date, fallback, "rate response had no usable BRL field, using fallback");
                Self::with_rate(date, fallback, false)
            }
            Err(e) => {
                tracing::warn!(date, fallback, error = %e, "rate lookup failed, using fallback");
                Self::with_rate(date, fallback, false)
            }
        }
    }

    pub fn with_rate(date: &str, rate: f64, fetched: bool) -> Self {
        Self {
            date: date.to_string(),
            rate,
            fetched,
        }
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// `true` if the rate came from the live lookup rather than the fallback.
    pub fn fetched(&self) -> bool {
        self.fetched
    }
}

impl FxResolver for DailyRate {
    fn rate_for(&mut self, _date: &str) -> f64 {
        self.rate
    }

    fn lookups(&self) -> u64 {
        u64::from(self.fetched)
    }
}

/// Extract a positive BRL rate from a rate-service response body.
///
/// Understands `{"rates": {"BRL": 5.1}}` and `{"USDBRL": {"bid": "5.1"}}`.
pub fn parse_rate(body: &Value) -> Option<f64> {
    let rate = body
        .get("rates")
        .and_then(|r| r.get("BRL"))
        .and_then(as_number)
        .or_else(|| body.get("USDBRL").and_then(|q| q.get("bid")).and_then(as_number))?;
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
