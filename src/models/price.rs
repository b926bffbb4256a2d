use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::CardId;
use crate::store::Row;

// ---------------------------------------------------------------------------
// PriceType
// ---------------------------------------------------------------------------

/// Direction of a price: what the store pays (`Buy`, the buylist) or what it
/// charges (`Sell`, retail).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceType {
    Buy,
    Sell,
}

impl PriceType {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceType::Buy => "buy",
            PriceType::Sell => "sell",
        }
    }

    /// Name of the section holding this price type in the feed.
    pub fn feed_section(self) -> &'static str {
        match self {
            PriceType::Buy => "buylist",
            PriceType::Sell => "retail",
        }
    }

    /// Denormalized `(usd, brl)` columns on the `cards` table.
    pub fn card_columns(self) -> (&'static str, &'static str) {
        match self {
            PriceType::Buy => ("ck_buy_usd", "ck_buy_brl"),
            PriceType::Sell => ("ck_retail_usd", "ck_retail_brl"),
        }
    }
}

impl fmt::Display for PriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PriceObservation — One row of `price_history`
// ---------------------------------------------------------------------------

/// A single observed price, unique on `(card_id, source, scraped_at, price_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub card_id: CardId,
    pub source: String,
    pub price_type: PriceType,
    pub price_raw: f64,
    pub currency: String,
    pub fx_rate_to_brl: f64,
    pub price_brl: f64,
    pub scraped_at: String,
}

impl PriceObservation {
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("card_id".into(), self.card_id.as_str().into());
        row.insert("source".into(), self.source.clone().into());
        row.insert("price_type".into(), self.price_type.as_str().into());
        row.insert("price_raw".into(), self.price_raw.into());
        row.insert("currency".into(), self.currency.clone().into());
        row.insert("fx_rate_to_brl".into(), self.fx_rate_to_brl.into());
        row.insert("price_brl".into(), self.price_brl.into());
        row.insert("scraped_at".into(), self.scraped_at.clone().into());
        row
    }
}

// ---------------------------------------------------------------------------
// LatestPrice
// ---------------------------------------------------------------------------

/// The newest observation of one price type, as projected onto `cards`.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestPrice {
    pub date: String,
    pub usd: f64,
    pub brl: f64,
}

impl LatestPrice {
    /// Replace `current` with `candidate` when the candidate is strictly newer.
    pub fn keep_newest(current: &mut Option<LatestPrice>, candidate: LatestPrice) {
        let newer = match current {
            Some(cur) => candidate.date > cur.date,
            None => true,
        };
        if newer {
            *current = Some(candidate);
        }
    }
}

impl From<&PriceObservation> for LatestPrice {
    fn from(obs: &PriceObservation) -> Self {
        Self {
            date: obs.scraped_at.clone(),
            usd: obs.price_raw,
            brl: obs.price_brl,
        }
    }
}
