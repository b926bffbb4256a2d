//! Resolves normalized feed UUIDs to local card variants.
//!
//! Both strategies read from the same in-memory map. A preloaded matcher
//! fills the map from the whole `cards` table once; a lazy matcher starts
//! empty and fetches each UUID on first use, caching misses as well.
//!
//! Every cached variant also carries the newest logged buy and sell dates
//! for the configured source, which the projector uses as per-type floors.

use std::collections::HashMap;

use crate::config::{CARDS_TABLE, PRICE_HISTORY_TABLE, SELECT_PAGE_SIZE};
use crate::error::{Result, StoreError, StoreErrorKind, StoreResult};
use crate::models::{CardId, CardVariant, PriceType, RunStatistics, VARIANT_COLUMNS};
use crate::projector::Projection;
use crate::retry::RetryPolicy;
use crate::store::{for_each_page, select_paged, Filter, Row, Store};

const DATE_COLUMNS: &[&str] = &["card_id", "price_type", "scraped_at"];

#[derive(Debug, Default)]
pub struct VariantMatcher {
    source: String,
    variants: HashMap<String, Vec<CardVariant>>,
    preloaded: bool,
}

impl VariantMatcher {
    /// A matcher that fetches each UUID from the store on first lookup.
    pub fn lazy(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }

    /// Load every variant that has a UUID, paging through the `cards` table,
    /// then the newest logged date per card and price type.
    pub fn preload<S: Store + ?Sized>(
        store: &mut S,
        retry: &RetryPolicy,
        stats: &mut RunStatistics,
        source: &str,
    ) -> Result<Self> {
        let filter = Filter::all().order_by(&["id"]);
        let rows = retry.run("load_cards", store, stats, |s| {
            select_paged(s, CARDS_TABLE, VARIANT_COLUMNS, &filter, SELECT_PAGE_SIZE)
        })?;
        let mut variants = parse_variants(rows)?;

        let filter = Filter::eq("source", source).order_by(&["card_id", "price_type", "scraped_at"]);
        let mut dates = PriceDates::default();
        let log_rows = retry.run("load_price_dates", store, stats, |s| {
            dates = PriceDates::default();
            for_each_page(s, PRICE_HISTORY_TABLE, DATE_COLUMNS, &filter, SELECT_PAGE_SIZE, |page| {
                dates.fold(&page)
            })
        })?;
        dates.apply(&mut variants);

        let mut matcher = Self {
            source: source.to_string(),
            variants: HashMap::new(),
            preloaded: true,
        };
        let total = variants.len();
        for variant in variants {
            if let Some(uuid) = variant.mtgjson_uuid.clone() {
                matcher.variants.entry(uuid).or_default().push(variant);
            }
        }
        tracing::info!(
            rows = total,
            uuids = matcher.variants.len(),
            log_rows,
            "preloaded card variants"
        );
        Ok(matcher)
    }

    pub fn is_preloaded(&self) -> bool {
        self.preloaded
    }

    /// Number of distinct UUIDs known (including cached misses when lazy).
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Variants carrying `uuid`; empty when the card is unknown locally.
    ///
    /// Only a lazy matcher touches the store, once per distinct UUID.
    pub fn lookup<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        retry: &RetryPolicy,
        stats: &mut RunStatistics,
        uuid: &str,
    ) -> StoreResult<Vec<CardVariant>> {
        if !self.preloaded && !self.variants.contains_key(uuid) {
            let filter = Filter::eq("mtgjson_uuid", uuid).order_by(&["id"]);
            let rows = retry.run("find_card", store, stats, |s| {
                s.select(CARDS_TABLE, VARIANT_COLUMNS, &filter)
            })?;
            let mut variants = parse_variants(rows)?;
            for variant in variants.iter_mut() {
                let filter = Filter::eq("card_id", variant.id.as_str()).and_eq("source", self.source.as_str());
                let log = retry.run("find_price_dates", store, stats, |s| {
                    s.select(PRICE_HISTORY_TABLE, DATE_COLUMNS, &filter)
                })?;
                let mut dates = PriceDates::default();
                dates.fold(&log);
                dates.apply(std::slice::from_mut(variant));
            }
            self.variants.insert(uuid.to_string(), variants);
        }
        Ok(self.variants.get(uuid).cloned().unwrap_or_default())
    }

    /// Record an applied projection so later entries in the same run compare
    /// against it.
    pub fn note_projection(&mut self, uuid: &str, projection: &Projection) {
        if let Some(variants) = self.variants.get_mut(uuid) {
            for v in variants.iter_mut().filter(|v| v.id == projection.card_id) {
                v.ck_last_update = Some(projection.last_update.clone());
                for (price_type, date) in &projection.applied {
                    v.note_price_date(*price_type, date);
                }
            }
        }
    }
}

/// Newest logged date per card and price type.
#[derive(Debug, Default)]
struct PriceDates(HashMap<(CardId, PriceType), String>);

impl PriceDates {
    /// Rows that do not name a card, a price type and a date are ignored.
    fn fold(&mut self, log: &[Row]) {
        for row in log {
            let card_id = row
                .get("card_id")
                .and_then(|v| serde_json::from_value::<CardId>(v.clone()).ok());
            let price_type = row
                .get("price_type")
                .and_then(|v| serde_json::from_value::<PriceType>(v.clone()).ok());
            let date = row.get("scraped_at").and_then(|v| v.as_str());
            let (Some(card_id), Some(price_type), Some(date)) = (card_id, price_type, date) else {
                continue;
            };
            match self.0.get_mut(&(card_id.clone(), price_type)) {
                Some(slot) if date > slot.as_str() => *slot = date.to_string(),
                Some(_) => {}
                None => {
                    self.0.insert((card_id, price_type), date.to_string());
                }
            }
        }
    }

    /// Raise each variant's per-type dates to the newest ones seen.
    fn apply(&self, variants: &mut [CardVariant]) {
        if self.0.is_empty() {
            return;
        }
        for variant in variants.iter_mut() {
            for price_type in [PriceType::Buy, PriceType::Sell] {
                if let Some(date) = self.0.get(&(variant.id.clone(), price_type)) {
                    variant.note_price_date(price_type, date);
                }
            }
        }
    }
}

fn parse_variants(rows: Vec<Row>) -> StoreResult<Vec<CardVariant>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
                StoreError::new(StoreErrorKind::Rejected, format!("malformed card row: {}", e))
            })
        })
        .collect()
}
