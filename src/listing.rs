//! Rows scraped from a rendered marketplace listing page.
//!
//! The browser automation lives elsewhere; this module only owns the row
//! contract and the money parsing the scrape relies on.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRow {
    pub name: String,
    pub price: f64,
}

/// A titled collection of scraped `(name, price)` rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub title: String,
    pub rows: Vec<ListingRow>,
}

impl Listing {
    /// Build a listing from raw cell text, prices in BRL notation.
    ///
    /// Rows with an empty name or an unparseable price are dropped. A blank
    /// title becomes `"Untitled"`.
    pub fn from_cells<I, N, P>(title: &str, cells: I) -> Self
    where
        I: IntoIterator<Item = (N, P)>,
        N: AsRef<str>,
        P: AsRef<str>,
    {
        let mut rows = Vec::new();
        for (name, price) in cells {
            let name = clean_card_name(name.as_ref());
            if name.is_empty() {
                continue;
            }
            match parse_brl_price(price.as_ref()) {
                Ok(price) => rows.push(ListingRow { name, price }),
                Err(e) => tracing::debug!(%name, error = %e, "dropping listing row"),
            }
        }

        let title = title.trim();
        Self {
            title: if title.is_empty() { UNTITLED.to_string() } else { title.to_string() },
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of all row prices.
    pub fn total(&self) -> f64 {
        self.rows.iter().map(|r| r.price).sum()
    }
}

/// Parse `"R$ 1.234,56"` style text. Blank input is `0.0`.
pub fn parse_brl_price(text: &str) -> Result<f64> {
    let clean = text.replace("R$", "");
    let clean = clean.trim();
    if clean.is_empty() {
        return Ok(0.0);
    }
    let normalized = clean.replace('.', "").replacen(',', ".", 1);
    parse_amount(text, &normalized)
}

/// Parse `"$1,234.56"` style text. Blank input is `0.0`.
pub fn parse_usd_price(text: &str) -> Result<f64> {
    let clean = text.replace('$', "");
    let clean = clean.trim();
    if clean.is_empty() {
        return Ok(0.0);
    }
    let normalized = clean.replace(',', "");
    parse_amount(text, &normalized)
}

fn parse_amount(original: &str, normalized: &str) -> Result<f64> {
    normalized
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| SyncError::InvalidPrice(original.to_string()))
}

/// Trim a card name and drop a trailing parenthetical, e.g. `"Sol Ring (KLD)"`.
pub fn clean_card_name(text: &str) -> String {
    let name = text.trim();
    if name.ends_with(')') {
        if let Some(open) = name.rfind('(') {
            return name[..open].trim_end().to_string();
        }
    }
    name.to_string()
}

/// Pull the collector number out of `"Collector #: 0204"`, dropping leading
/// zeros but keeping a lone `"0"`.
pub fn extract_collector_number(text: &str) -> Option<String> {
    let (_, rest) = text.split_once("Collector #:")?;
    let raw = rest.split_whitespace().next()?;
    let trimmed = raw.trim_start_matches('0');
    Some(if trimmed.is_empty() { raw.to_string() } else { trimmed.to_string() })
}
