//! Turns one `{date: amount}` feed series into price observations.

use serde_json::{Map, Value};

use crate::config::{FEED_CURRENCY, FLAT_FEE_BRL};
use crate::fx::FxResolver;
use crate::models::{CardId, LatestPrice, PriceObservation, PriceType};

/// Observations built from one series, plus its newest entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltSeries {
    pub observations: Vec<PriceObservation>,
    /// Newest observation by ISO date; ties keep the first seen.
    pub latest: Option<LatestPrice>,
    /// Entries whose amount was not a JSON number.
    pub skipped: usize,
}

/// Convert a USD amount at `rate`, adding the flat fee.
pub fn to_brl(usd: f64, rate: f64) -> f64 {
    usd * rate + FLAT_FEE_BRL
}

/// Build observations for `card_id` from a single price series.
///
/// Non-numeric amounts are skipped and counted, never errors. When
/// `only_date` is set, every other date is ignored without being counted.
pub fn build_series(
    card_id: &CardId,
    source: &str,
    price_type: PriceType,
    series: &Map<String, Value>,
    fx: &mut dyn FxResolver,
    only_date: Option<&str>,
) -> BuiltSeries {
    let mut built = BuiltSeries::default();

    for (date, amount) in series {
        if only_date.is_some_and(|d| d != date.as_str()) {
            continue;
        }
        let Some(usd) = amount.as_f64() else {
            built.skipped += 1;
            continue;
        };

        let rate = fx.rate_for(date);
        let obs = PriceObservation {
            card_id: card_id.clone(),
            source: source.to_string(),
            price_type,
            price_raw: usd,
            currency: FEED_CURRENCY.to_string(),
            fx_rate_to_brl: rate,
            price_brl: to_brl(usd, rate),
            scraped_at: date.clone(),
        };
        LatestPrice::keep_newest(&mut built.latest, LatestPrice::from(&obs));
        built.observations.push(obs);
    }

    built
}
