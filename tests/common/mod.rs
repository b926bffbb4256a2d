//! Shared fixtures for the price-sync integration tests.
//!
//! `sample_store()` returns an in-memory DuckDB store seeded with a handful
//! of card variants. `FailingStore` wraps any store and injects failures.

#![allow(dead_code)]

use std::time::Duration;

use mtg_price_sync::store::{Filter, Row, Store};
use mtg_price_sync::{DuckDbStore, StoreError, StoreErrorKind, StoreResult, SyncConfig};
use serde_json::{json, Value};

/// Two variants (normal and foil) share this UUID.
pub const UUID_SHARED: &str = "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa";
/// Compact form of [`UUID_SHARED`] as it appears as a feed key.
pub const KEY_SHARED: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
/// A single normal variant that already carries prices from 2025-06-01.
pub const UUID_PRICED: &str = "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb";
/// Valid shape, but no local card has it.
pub const UUID_UNKNOWN: &str = "cccccccc-cccc-cccc-cccc-cccccccccccc";

/// In-memory store with the sample cards loaded.
pub fn sample_store() -> DuckDbStore {
    let store = DuckDbStore::open_in_memory().unwrap();
    store
        .raw()
        .execute_batch(
            "INSERT INTO cards (id, name, set_code, mtgjson_uuid, is_foil) VALUES
                ('card-1', 'Lightning Bolt', 'A25', 'aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa', FALSE),
                ('card-2', 'Lightning Bolt', 'A25', 'aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa', TRUE);
             INSERT INTO cards (id, name, set_code, mtgjson_uuid, is_foil,
                                ck_buy_usd, ck_buy_brl, ck_retail_usd, ck_retail_brl, ck_last_update) VALUES
                ('card-3', 'Counterspell', 'MH2', 'bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb', FALSE,
                 9.0, 49.8, 12.0, 66.3, '2025-06-01');
             INSERT INTO cards (id, name, set_code, mtgjson_uuid, is_foil) VALUES
                ('card-4', 'Island', 'LEA', NULL, FALSE);",
        )
        .unwrap();
    store
}

/// Defaults with no sleeping between retries and no periodic logging.
pub fn test_config() -> SyncConfig {
    SyncConfig::default()
        .retries(3, Duration::ZERO)
        .progress_every(0)
        .refresh_every(0)
}

/// A feed entry with a Card Kingdom block.
///
/// Each argument is a `{finish: {date: amount}}` object, or `Value::Null`
/// to leave the section out.
pub fn ck_entry(buylist: Value, retail: Value) -> Value {
    let mut block = serde_json::Map::new();
    if !buylist.is_null() {
        block.insert("buylist".to_string(), buylist);
    }
    if !retail.is_null() {
        block.insert("retail".to_string(), retail);
    }
    json!({ "paper": { "cardkingdom": Value::Object(block) } })
}

/// Fetch one card row by id.
pub fn card(store: &DuckDbStore, id: &str) -> Row {
    store
        .execute("SELECT * FROM cards WHERE id = ?", &[json!(id)])
        .unwrap()
        .into_iter()
        .next()
        .unwrap()
}

/// All price_history rows, in natural-key order.
pub fn history(store: &DuckDbStore) -> Vec<Row> {
    store
        .execute(
            "SELECT * FROM price_history ORDER BY card_id, source, scraped_at, price_type",
            &[],
        )
        .unwrap()
}

// ---------------------------------------------------------------------------
// FailingStore
// ---------------------------------------------------------------------------

/// Wraps a store and fails a configurable number of selects, upserts and
/// updates. It can also cap the rows a single select returns.
pub struct FailingStore<S> {
    pub inner: S,
    pub select_failures: u32,
    pub upsert_failures: u32,
    pub update_failures: u32,
    pub kind: StoreErrorKind,
    pub row_cap: Option<usize>,
    pub select_calls: u32,
    pub upsert_calls: u32,
    pub update_calls: u32,
    pub reconnects: u32,
}

impl<S: Store> FailingStore<S> {
    pub fn new(inner: S, kind: StoreErrorKind) -> Self {
        Self {
            inner,
            select_failures: 0,
            upsert_failures: 0,
            update_failures: 0,
            kind,
            row_cap: None,
            select_calls: 0,
            upsert_calls: 0,
            update_calls: 0,
            reconnects: 0,
        }
    }

    pub fn failing_selects(mut self, n: u32) -> Self {
        self.select_failures = n;
        self
    }

    /// Truncate every select response to `n` rows, like PostgREST `max-rows`.
    pub fn row_cap(mut self, n: usize) -> Self {
        self.row_cap = Some(n);
        self
    }

    pub fn failing_upserts(mut self, n: u32) -> Self {
        self.upsert_failures = n;
        self
    }

    pub fn failing_updates(mut self, n: u32) -> Self {
        self.update_failures = n;
        self
    }

    fn error(&self, op: &str) -> StoreError {
        StoreError::new(self.kind, format!("injected {} failure", op))
    }
}

impl<S: Store> Store for FailingStore<S> {
    fn select(&mut self, table: &str, columns: &[&str], filter: &Filter) -> StoreResult<Vec<Row>> {
        self.select_calls += 1;
        if self.select_failures > 0 {
            self.select_failures -= 1;
            return Err(self.error("select"));
        }
        let mut rows = self.inner.select(table, columns, filter)?;
        if let Some(cap) = self.row_cap {
            rows.truncate(cap);
        }
        Ok(rows)
    }

    fn upsert(&mut self, table: &str, rows: &[Row], conflict_key: &[&str]) -> StoreResult<usize> {
        self.upsert_calls += 1;
        if self.upsert_failures > 0 {
            self.upsert_failures -= 1;
            return Err(self.error("upsert"));
        }
        self.inner.upsert(table, rows, conflict_key)
    }

    fn update(&mut self, table: &str, patch: &Row, filter: &Filter) -> StoreResult<usize> {
        self.update_calls += 1;
        if self.update_failures > 0 {
            self.update_failures -= 1;
            return Err(self.error("update"));
        }
        self.inner.update(table, patch, filter)
    }

    fn invalidate(&mut self) {
        self.inner.invalidate()
    }

    fn reconnect(&mut self) -> StoreResult<()> {
        self.reconnects += 1;
        self.inner.reconnect()
    }
}
