use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::models::PriceType;

// ---------------------------------------------------------------------------
// CardId — Opaque primary key of a `cards` row
// ---------------------------------------------------------------------------

/// Primary key of a card variant.
///
/// Stores may hand back either a string (uuid column) or an integer; both
/// deserialize into the same textual form and serialize back as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CardId(String);

impl CardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CardId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Serialize for CardId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CardId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => CardId(s),
            RawId::Signed(n) => CardId(n.to_string()),
            RawId::Unsigned(n) => CardId(n.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Finish
// ---------------------------------------------------------------------------

/// Physical finish of a printing. Keys the per-finish maps in the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finish {
    Normal,
    Foil,
}

impl Finish {
    pub fn from_foil(is_foil: bool) -> Self {
        if is_foil {
            Finish::Foil
        } else {
            Finish::Normal
        }
    }

    /// Key used for this finish inside the price feed.
    pub fn feed_key(self) -> &'static str {
        match self {
            Finish::Normal => "normal",
            Finish::Foil => "foil",
        }
    }
}

// ---------------------------------------------------------------------------
// CardVariant — One row of the `cards` table
// ---------------------------------------------------------------------------

/// Columns fetched whenever variants are loaded for matching.
pub const VARIANT_COLUMNS: &[&str] = &["id", "mtgjson_uuid", "is_foil", "ck_last_update"];

/// A locally stored card printing, one per finish.
///
/// Several variants may share an `mtgjson_uuid`; they are told apart by
/// `is_foil`. The `ck_*` fields are a denormalized copy of the latest
/// observed Card Kingdom prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardVariant {
    pub id: CardId,
    #[serde(default)]
    pub mtgjson_uuid: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_foil: bool,
    #[serde(default)]
    pub ck_buy_usd: Option<f64>,
    #[serde(default)]
    pub ck_buy_brl: Option<f64>,
    #[serde(default)]
    pub ck_retail_usd: Option<f64>,
    #[serde(default)]
    pub ck_retail_brl: Option<f64>,
    #[serde(default)]
    pub ck_last_update: Option<String>,
    /// Newest logged buy date. Not a column; filled from `price_history`.
    #[serde(skip)]
    pub last_buy_date: Option<String>,
    /// Newest logged sell date. Not a column; filled from `price_history`.
    #[serde(skip)]
    pub last_sell_date: Option<String>,
}

impl CardVariant {
    pub fn finish(&self) -> Finish {
        Finish::from_foil(self.is_foil)
    }

    /// Oldest date a new `price_type` value may carry and still be projected.
    ///
    /// The newest logged date of that type, or `ck_last_update` when the log
    /// holds nothing for it.
    pub fn price_floor(&self, price_type: PriceType) -> Option<&str> {
        let logged = match price_type {
            PriceType::Buy => &self.last_buy_date,
            PriceType::Sell => &self.last_sell_date,
        };
        logged.as_deref().or(self.ck_last_update.as_deref())
    }

    /// Raise the known date for `price_type`; older dates are ignored.
    pub fn note_price_date(&mut self, price_type: PriceType, date: &str) {
        let slot = match price_type {
            PriceType::Buy => &mut self.last_buy_date,
            PriceType::Sell => &mut self.last_sell_date,
        };
        if slot.as_deref().map_or(true, |d| date > d) {
            *slot = Some(date.to_string());
        }
    }
}

fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}
