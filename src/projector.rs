//! Pushes the newest observed prices onto a card's denormalized `ck_*` fields.
//!
//! Each price type is patched on its own: a new buy price never touches the
//! retail columns and vice versa. A type is only applied when its date is not
//! older than the newest date already known for that same type (see
//! [`CardVariant::price_floor`]). The write is best effort; the
//! observation log stays the source of truth and
//! [`reconcile_latest`](crate::reconcile::reconcile_latest) rebuilds anything
//! lost here.

use serde_json::Value;

use crate::config::CARDS_TABLE;
use crate::models::{CardId, CardVariant, LatestPrice, Outcome, PriceType, SkipReason};
use crate::store::{Filter, Row, Store};

/// A planned patch for one card.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub card_id: CardId,
    pub patch: Row,
    /// Value written to `ck_last_update`.
    pub last_update: String,
    /// Price types in the patch, with the date each was observed on.
    pub applied: Vec<(PriceType, String)>,
}

/// Decide what to write for `variant` given the newest buy/sell prices.
///
/// Returns `Err(Empty)` when there is nothing to project and
/// `Err(NothingNewer)` when every candidate predates its type's floor.
pub fn plan_projection(
    variant: &CardVariant,
    buy: Option<&LatestPrice>,
    sell: Option<&LatestPrice>,
) -> Result<Projection, SkipReason> {
    if buy.is_none() && sell.is_none() {
        return Err(SkipReason::Empty);
    }

    let mut patch = Row::new();
    let mut applied = Vec::new();
    let mut last_update = variant.ck_last_update.clone();

    for (price_type, latest) in [(PriceType::Buy, buy), (PriceType::Sell, sell)] {
        let Some(latest) = latest else { continue };
        if variant
            .price_floor(price_type)
            .is_some_and(|f| latest.date.as_str() < f)
        {
            continue;
        }
        let (usd_col, brl_col) = price_type.card_columns();
        patch.insert(usd_col.to_string(), latest.usd.into());
        patch.insert(brl_col.to_string(), latest.brl.into());
        applied.push((price_type, latest.date.clone()));
        if last_update.as_deref().map_or(true, |l| latest.date.as_str() > l) {
            last_update = Some(latest.date.clone());
        }
    }

    match last_update {
        Some(last_update) if !patch.is_empty() => {
            patch.insert("ck_last_update".to_string(), Value::String(last_update.clone()));
            Ok(Projection {
                card_id: variant.id.clone(),
                patch,
                last_update,
                applied,
            })
        }
        _ => Err(SkipReason::NothingNewer),
    }
}

/// Write a planned projection. One attempt, never retried, never propagated.
pub fn apply_projection<S: Store + ?Sized>(
    store: &mut S,
    projection: &Projection,
    dry_run: bool,
) -> Outcome {
    if dry_run {
        return Outcome::Recorded;
    }
    let filter = Filter::eq("id", projection.card_id.as_str());
    match store.update(CARDS_TABLE, &projection.patch, &filter) {
        Ok(0) => {
            tracing::warn!(card_id = %projection.card_id, "latest-price update matched no card");
            Outcome::Failed(format!("card {} not found", projection.card_id))
        }
        Ok(_) => Outcome::Recorded,
        Err(e) => {
            tracing::warn!(card_id = %projection.card_id, error = %e, "latest-price update failed");
            Outcome::Failed(e.to_string())
        }
    }
}

/// Plan and apply in one step.
pub fn project_latest<S: Store + ?Sized>(
    store: &mut S,
    variant: &CardVariant,
    buy: Option<&LatestPrice>,
    sell: Option<&LatestPrice>,
    dry_run: bool,
) -> Outcome {
    match plan_projection(variant, buy, sell) {
        Ok(projection) => apply_projection(store, &projection, dry_run),
        Err(reason) => Outcome::Skipped(reason),
    }
}
