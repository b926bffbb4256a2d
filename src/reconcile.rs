//! Rebuilds every card's latest-price fields from the observation log.
//!
//! Scans `price_history` for one source, keeps the newest row per
//! `(card_id, price_type)`, and overwrites the matching `ck_*` columns. The
//! pass depends only on the log, so running it again on unchanged data
//! produces the same card state, whatever earlier projections did.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::config::{CARDS_TABLE, PRICE_HISTORY_TABLE, SELECT_PAGE_SIZE};
use crate::error::Result;
use crate::models::{CardId, LatestPrice, Outcome, PriceType, RunStatistics};
use crate::projector::{apply_projection, Projection};
use crate::retry::RetryPolicy;
use crate::store::{for_each_page, Filter, Row, Store};

const HISTORY_COLUMNS: &[&str] = &["card_id", "price_type", "price_raw", "price_brl", "scraped_at"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub rows_scanned: usize,
    /// Rows that could not be read (bad price type, missing fields).
    pub rows_ignored: usize,
    pub cards: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Newest buy and sell observation for one card.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardLatest {
    pub buy: Option<LatestPrice>,
    pub sell: Option<LatestPrice>,
}

/// Group observation rows into the newest buy/sell per card.
///
/// Returns the groups and the number of rows that were ignored.
pub fn latest_by_card(rows: &[Row]) -> (BTreeMap<CardId, CardLatest>, usize) {
    let mut groups = BTreeMap::new();
    let ignored = fold_latest(&mut groups, rows);
    (groups, ignored)
}

/// Merge `rows` into `groups`, returning how many rows were ignored.
fn fold_latest(groups: &mut BTreeMap<CardId, CardLatest>, rows: &[Row]) -> usize {
    let mut ignored = 0;
    for row in rows {
        let Some((card_id, price_type, latest)) = parse_row(row) else {
            ignored += 1;
            continue;
        };
        let entry = groups.entry(card_id).or_default();
        let slot = match price_type {
            PriceType::Buy => &mut entry.buy,
            PriceType::Sell => &mut entry.sell,
        };
        LatestPrice::keep_newest(slot, latest);
    }
    ignored
}

fn parse_row(row: &Row) -> Option<(CardId, PriceType, LatestPrice)> {
    let card_id: CardId = serde_json::from_value(row.get("card_id")?.clone()).ok()?;
    let price_type: PriceType = serde_json::from_value(row.get("price_type")?.clone()).ok()?;
    let latest = LatestPrice {
        date: row.get("scraped_at")?.as_str()?.to_string(),
        usd: row.get("price_raw")?.as_f64()?,
        brl: row.get("price_brl")?.as_f64()?,
    };
    Some((card_id, price_type, latest))
}

/// Build the full-overwrite patch for one card.
pub fn reconcile_projection(card_id: &CardId, latest: &CardLatest) -> Option<Projection> {
    let mut patch = Row::new();
    let mut applied = Vec::new();
    let mut last_update: Option<&str> = None;

    for (price_type, slot) in [(PriceType::Buy, &latest.buy), (PriceType::Sell, &latest.sell)] {
        let Some(p) = slot else { continue };
        let (usd_col, brl_col) = price_type.card_columns();
        patch.insert(usd_col.to_string(), p.usd.into());
        patch.insert(brl_col.to_string(), p.brl.into());
        applied.push((price_type, p.date.clone()));
        if last_update.map_or(true, |l| p.date.as_str() > l) {
            last_update = Some(p.date.as_str());
        }
    }

    let last_update = last_update?.to_string();
    patch.insert("ck_last_update".to_string(), Value::String(last_update.clone()));
    Some(Projection {
        card_id: card_id.clone(),
        patch,
        last_update,
        applied,
    })
}

/// Recompute latest prices for every card with observations from `source`.
///
/// A failure to scan the log is fatal. Individual card updates that fail are
/// counted in the report and the pass moves on.
pub fn reconcile_latest<S: Store + ?Sized>(
    store: &mut S,
    source: &str,
    retry: &RetryPolicy,
    stats: &mut RunStatistics,
    dry_run: bool,
) -> Result<ReconcileReport> {
    let filter = Filter::eq("source", source).order_by(&["card_id", "price_type", "scraped_at"]);
    let mut groups: BTreeMap<CardId, CardLatest> = BTreeMap::new();
    let mut ignored = 0;
    let scanned = retry.run("scan_price_history", store, stats, |s| {
        groups.clear();
        ignored = 0;
        for_each_page(s, PRICE_HISTORY_TABLE, HISTORY_COLUMNS, &filter, SELECT_PAGE_SIZE, |page| {
            ignored += fold_latest(&mut groups, &page)
        })
    })?;

    let mut report = ReconcileReport {
        rows_scanned: scanned,
        rows_ignored: ignored,
        cards: groups.len(),
        ..Default::default()
    };
    tracing::info!(
        rows = report.rows_scanned,
        cards = report.cards,
        table = CARDS_TABLE,
        "reconciling latest prices"
    );

    for (i, (card_id, latest)) in groups.iter().enumerate() {
        let Some(projection) = reconcile_projection(card_id, latest) else {
            continue;
        };
        let outcome = apply_projection(store, &projection, dry_run);
        stats.tally_projection(&outcome);
        match outcome {
            Outcome::Recorded => report.updated += 1,
            Outcome::Failed(_) => report.failed += 1,
            Outcome::Skipped(_) => {}
        }
        if (i + 1) % 1000 == 0 {
            tracing::info!(done = i + 1, total = report.cards, "reconcile progress");
        }
    }

    tracing::info!(
        updated = report.updated,
        failed = report.failed,
        ignored = report.rows_ignored,
        "reconcile complete"
    );
    Ok(report)
}
