//! End-to-end runs of the batch driver against an in-memory store.

mod common;

use mtg_price_sync::config::{ImportMode, MatchStrategy};
use mtg_price_sync::fx::FixedRate;
use mtg_price_sync::models::{Outcome, SkipReason};
use mtg_price_sync::{PriceFeed, PriceSync, StoreErrorKind};
use serde_json::{json, Value};

use common::{ck_entry, FailingStore, KEY_SHARED, UUID_PRICED, UUID_UNKNOWN};

fn feed(data: Value) -> PriceFeed {
    PriceFeed::from_value(json!({ "meta": {"date": "2025-01-01"}, "data": data }))
}

fn fixed() -> Box<FixedRate> {
    Box::new(FixedRate::new(5.5))
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[test]
fn single_buy_price_lands_in_history_and_on_card() {
    let data = json!({
        KEY_SHARED: ck_entry(json!({"normal": {"2025-01-01": 2.0}}), Value::Null),
    });
    let mut sync = PriceSync::new(common::sample_store(), common::test_config(), fixed());
    let stats = sync.run(&feed(data)).unwrap();

    assert_eq!(stats.entries_processed, 1);
    assert_eq!(stats.prices_inserted, 1);
    assert_eq!(stats.cards_updated, 1);
    assert_eq!(stats.unmatched, 0);

    let store = sync.into_store();
    let rows = common::history(&store);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["card_id"], "card-1");
    assert_eq!(rows[0]["price_type"], "buy");
    assert_eq!(rows[0]["price_raw"], 2.0);
    assert_eq!(rows[0]["scraped_at"], "2025-01-01");
    assert!((rows[0]["price_brl"].as_f64().unwrap() - 11.30).abs() < 1e-9);

    let card = common::card(&store, "card-1");
    assert_eq!(card["ck_buy_usd"], 2.0);
    assert_eq!(card["ck_last_update"], "2025-01-01");
    assert!(card["ck_retail_usd"].is_null());

    // The foil variant had no foil prices.
    assert!(common::card(&store, "card-2")["ck_buy_usd"].is_null());
}

#[test]
fn compact_key_with_empty_retail_block() {
    let doc = json!({
        "data": {
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa": {
                "paper": {"cardkingdom": {"buylist": {"normal": {"2025-01-01": 2.0}}, "retail": {}}}
            }
        }
    });
    let store = mtg_price_sync::DuckDbStore::open_in_memory().unwrap();
    store
        .raw()
        .execute_batch(
            "INSERT INTO cards (id, mtgjson_uuid, is_foil)
             VALUES ('only', 'aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa', FALSE);",
        )
        .unwrap();

    let mut sync = PriceSync::new(store, common::test_config(), fixed());
    sync.run(&PriceFeed::from_value(doc)).unwrap();

    let rows = common::history(sync.store());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["price_type"], "buy");
    let card = common::card(sync.store(), "only");
    assert_eq!(card["ck_buy_usd"], 2.0);
    assert_eq!(card["ck_last_update"], "2025-01-01");
}

#[test]
fn finishes_fan_out_to_their_own_variants() {
    let data = json!({
        KEY_SHARED: ck_entry(
            json!({"normal": {"2025-01-01": 1.0}, "foil": {"2025-01-01": 3.0}}),
            json!({"normal": {"2025-01-01": 2.0}, "foil": {"2025-01-01": 6.0}}),
        ),
    });
    let mut sync = PriceSync::new(common::sample_store(), common::test_config(), fixed());
    let stats = sync.run(&feed(data)).unwrap();
    assert_eq!(stats.prices_inserted, 4);
    assert_eq!(stats.cards_updated, 2);

    let store = sync.into_store();
    let normal = common::card(&store, "card-1");
    let foil = common::card(&store, "card-2");
    assert_eq!(normal["ck_buy_usd"], 1.0);
    assert_eq!(normal["ck_retail_usd"], 2.0);
    assert_eq!(foil["ck_buy_usd"], 3.0);
    assert_eq!(foil["ck_retail_usd"], 6.0);
}

#[test]
fn rerunning_the_same_feed_does_not_duplicate_history() {
    let data = json!({
        KEY_SHARED: ck_entry(json!({"normal": {"2025-01-01": 2.0, "2025-01-02": 2.5}}), Value::Null),
    });
    let feed = feed(data);
    let mut sync = PriceSync::new(common::sample_store(), common::test_config(), fixed());
    sync.run(&feed).unwrap();
    let store = sync.into_store();

    let mut again = PriceSync::new(store, common::test_config(), fixed());
    again.run(&feed).unwrap();
    assert_eq!(common::history(again.store()).len(), 2);
}

#[test]
fn small_batches_flush_during_the_run() {
    let data = json!({
        KEY_SHARED: ck_entry(
            json!({"normal": {"2025-01-01": 1.0, "2025-01-02": 1.1, "2025-01-03": 1.2}}),
            json!({"normal": {"2025-01-01": 2.0, "2025-01-02": 2.1, "2025-01-03": 2.2}}),
        ),
    });
    let config = common::test_config().batch_size(2);
    let mut sync = PriceSync::new(common::sample_store(), config, fixed());
    let stats = sync.run(&feed(data)).unwrap();
    assert_eq!(stats.prices_inserted, 6);
    assert_eq!(stats.flushes, 1);
    assert_eq!(sync.pending(), 0);
    assert_eq!(common::history(sync.store()).len(), 6);
}

// ---------------------------------------------------------------------------
// Skips and misses
// ---------------------------------------------------------------------------

#[test]
fn skips_are_counted_by_reason() {
    let data = json!({
        "short-id": ck_entry(json!({"normal": {"2025-01-01": 1.0}}), Value::Null),
        UUID_UNKNOWN: ck_entry(json!({"normal": {"2025-01-01": 1.0}}), Value::Null),
        UUID_PRICED: {"paper": {"tcgplayer": {"retail": {"normal": {"2025-01-01": 1.0}}}}},
    });
    let mut sync = PriceSync::new(common::sample_store(), common::test_config(), fixed());
    let stats = sync.run(&feed(data)).unwrap();

    assert_eq!(stats.entries_processed, 3);
    assert_eq!(stats.invalid_ids, 1);
    assert_eq!(stats.unmatched, 1);
    assert_eq!(stats.no_price, 1);
    assert_eq!(stats.prices_inserted, 0);
    assert_eq!(stats.flushes, 0);
}

#[test]
fn process_entry_reports_outcomes() {
    let mut sync = PriceSync::new(common::sample_store(), common::test_config(), fixed());
    sync.prepare().unwrap();

    assert_eq!(
        sync.process_entry("nope", &json!({})),
        Outcome::Skipped(SkipReason::InvalidIdentifier)
    );
    assert_eq!(
        sync.process_entry(UUID_UNKNOWN, &json!({})),
        Outcome::Skipped(SkipReason::Unmatched)
    );
    assert_eq!(
        sync.process_entry(UUID_PRICED, &json!({"paper": {}})),
        Outcome::Skipped(SkipReason::NoPriceData)
    );
    assert_eq!(
        sync.process_entry(UUID_PRICED, &ck_entry(json!({"normal": {"2025-07-01": 1.0}}), Value::Null)),
        Outcome::Recorded
    );
    assert_eq!(sync.pending(), 1);
}

#[test]
fn non_numeric_values_are_skipped_not_fatal() {
    let data = json!({
        KEY_SHARED: ck_entry(json!({"normal": {"2025-01-01": "oops", "2025-01-02": 2.0}}), Value::Null),
    });
    let mut sync = PriceSync::new(common::sample_store(), common::test_config(), fixed());
    let stats = sync.run(&feed(data)).unwrap();
    assert_eq!(stats.values_skipped, 1);
    assert_eq!(stats.prices_inserted, 1);
}

// ---------------------------------------------------------------------------
// Projection guard
// ---------------------------------------------------------------------------

#[test]
fn older_feed_prices_do_not_overwrite_newer_card_state() {
    let data = json!({
        UUID_PRICED: ck_entry(json!({"normal": {"2025-01-01": 1.0}}), Value::Null),
    });
    let mut sync = PriceSync::new(common::sample_store(), common::test_config(), fixed());
    let stats = sync.run(&feed(data)).unwrap();
    assert_eq!(stats.prices_inserted, 1);
    assert_eq!(stats.cards_updated, 0);
    assert_eq!(stats.projections_skipped, 1);

    let card = common::card(sync.store(), "card-3");
    assert_eq!(card["ck_buy_usd"], 9.0);
    assert_eq!(card["ck_last_update"], "2025-06-01");
}

#[test]
fn newer_sell_date_does_not_block_a_newer_buy_price() {
    for strategy in [MatchStrategy::Preload, MatchStrategy::Lazy] {
        let config = || common::test_config().match_strategy(strategy);

        let first = json!({
            KEY_SHARED: ck_entry(
                json!({"normal": {"2025-01-01": 1.0}}),
                json!({"normal": {"2025-01-05": 5.0}}),
            ),
        });
        let mut sync = PriceSync::new(common::sample_store(), config(), fixed());
        sync.run(&feed(first)).unwrap();
        let store = sync.into_store();
        assert_eq!(common::card(&store, "card-1")["ck_last_update"], "2025-01-05");

        let second = json!({
            KEY_SHARED: ck_entry(json!({"normal": {"2025-01-03": 3.0}}), Value::Null),
        });
        let mut sync = PriceSync::new(store, config(), fixed());
        let stats = sync.run(&feed(second)).unwrap();
        assert_eq!(stats.cards_updated, 1, "{:?}", strategy);
        assert_eq!(stats.projections_skipped, 0);

        let card = common::card(sync.store(), "card-1");
        assert_eq!(card["ck_buy_usd"], 3.0);
        assert_eq!(card["ck_retail_usd"], 5.0);
        assert_eq!(card["ck_last_update"], "2025-01-05");

        // A buy older than the newest logged buy is still refused.
        let third = json!({
            KEY_SHARED: ck_entry(json!({"normal": {"2025-01-02": 9.0}}), Value::Null),
        });
        let mut sync = PriceSync::new(sync.into_store(), config(), fixed());
        let stats = sync.run(&feed(third)).unwrap();
        assert_eq!(stats.cards_updated, 0);
        assert_eq!(stats.projections_skipped, 1);
        assert_eq!(common::card(sync.store(), "card-1")["ck_buy_usd"], 3.0);

        // The repair pass lands on the same state.
        sync.reconcile().unwrap();
        let card = common::card(sync.store(), "card-1");
        assert_eq!(card["ck_buy_usd"], 3.0);
        assert_eq!(card["ck_retail_usd"], 5.0);
        assert_eq!(card["ck_last_update"], "2025-01-05");
    }
}

#[test]
fn project_latest_can_be_disabled() {
    let data = json!({
        KEY_SHARED: ck_entry(json!({"normal": {"2025-01-01": 2.0}}), Value::Null),
    });
    let config = common::test_config().project_latest(false);
    let mut sync = PriceSync::new(common::sample_store(), config, fixed());
    let stats = sync.run(&feed(data)).unwrap();
    assert_eq!(stats.prices_inserted, 1);
    assert_eq!(stats.cards_updated, 0);
    assert!(common::card(sync.store(), "card-1")["ck_buy_usd"].is_null());
}

// ---------------------------------------------------------------------------
// Modes and limits
// ---------------------------------------------------------------------------

#[test]
fn dry_run_reports_the_same_statistics_without_writing() {
    let data = json!({
        KEY_SHARED: ck_entry(json!({"normal": {"2025-01-01": 2.0}}), json!({"foil": {"2025-01-01": 5.0}})),
        UUID_UNKNOWN: ck_entry(json!({"normal": {"2025-01-01": 1.0}}), Value::Null),
    });
    let feed = feed(data);

    let mut real = PriceSync::new(common::sample_store(), common::test_config(), fixed());
    let real_stats = real.run(&feed).unwrap();

    let mut dry = PriceSync::new(common::sample_store(), common::test_config().dry_run(true), fixed());
    let dry_stats = dry.run(&feed).unwrap();

    assert_eq!(real_stats, dry_stats);
    assert_eq!(dry.store().count("price_history").unwrap(), 0);
    assert!(common::card(dry.store(), "card-1")["ck_buy_usd"].is_null());
}

#[test]
fn max_cards_stops_early() {
    let data = json!({
        KEY_SHARED: ck_entry(json!({"normal": {"2025-01-01": 2.0}}), Value::Null),
        UUID_PRICED: ck_entry(json!({"normal": {"2025-07-01": 2.0}}), Value::Null),
        UUID_UNKNOWN: ck_entry(json!({"normal": {"2025-01-01": 1.0}}), Value::Null),
    });
    let config = common::test_config().max_cards(Some(2));
    let mut sync = PriceSync::new(common::sample_store(), config, fixed());
    let stats = sync.run(&feed(data)).unwrap();
    assert_eq!(stats.entries_processed, 2);
    assert_eq!(stats.unmatched, 0);
}

#[test]
fn daily_mode_only_imports_the_target_date() {
    let data = json!({
        KEY_SHARED: ck_entry(
            json!({"normal": {"2025-01-01": 1.0, "2025-01-02": 2.0}}),
            Value::Null,
        ),
    });
    let config = common::test_config().mode(ImportMode::Daily { date: "2025-01-02".to_string() });
    let mut sync = PriceSync::new(common::sample_store(), config, fixed());
    let stats = sync.run(&feed(data)).unwrap();
    assert_eq!(stats.prices_inserted, 1);
    assert_eq!(stats.values_skipped, 0);

    let rows = common::history(sync.store());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["scraped_at"], "2025-01-02");
}

#[test]
fn lazy_matching_gives_the_same_result_as_preload() {
    let data = json!({
        KEY_SHARED: ck_entry(json!({"normal": {"2025-01-01": 2.0}, "foil": {"2025-01-01": 4.0}}), Value::Null),
        UUID_UNKNOWN: ck_entry(json!({"normal": {"2025-01-01": 1.0}}), Value::Null),
    });
    let feed = feed(data);

    let mut preload = PriceSync::new(common::sample_store(), common::test_config(), fixed());
    let preload_stats = preload.run(&feed).unwrap();

    let config = common::test_config().match_strategy(MatchStrategy::Lazy);
    let mut lazy = PriceSync::new(common::sample_store(), config, fixed());
    let lazy_stats = lazy.run(&feed).unwrap();

    assert_eq!(preload_stats, lazy_stats);
    assert_eq!(
        common::history(preload.store()).len(),
        common::history(lazy.store()).len()
    );
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[test]
fn failed_flush_is_counted_and_run_completes() {
    let data = json!({
        KEY_SHARED: ck_entry(json!({"normal": {"2025-01-01": 2.0}}), Value::Null),
    });
    let store = FailingStore::new(common::sample_store(), StoreErrorKind::Network).failing_upserts(u32::MAX);
    let mut sync = PriceSync::new(store, common::test_config(), fixed());
    let stats = sync.run(&feed(data)).unwrap();

    assert_eq!(stats.retries, 3);
    assert_eq!(stats.failed_flushes, 1);
    assert_eq!(stats.prices_dropped, 1);
    assert_eq!(stats.prices_inserted, 0);
    // Projection is independent of the log write.
    assert_eq!(stats.cards_updated, 1);
}

#[test]
fn run_continues_past_a_dropped_batch() {
    let data = json!({
        KEY_SHARED: ck_entry(json!({"normal": {"2025-01-01": 2.0}}), Value::Null),
        UUID_PRICED: ck_entry(json!({"normal": {"2025-07-01": 3.0}}), Value::Null),
    });
    let store = FailingStore::new(common::sample_store(), StoreErrorKind::Unavailable).failing_upserts(3);
    let config = common::test_config().batch_size(1);
    let mut sync = PriceSync::new(store, config, fixed());
    let stats = sync.run(&feed(data)).unwrap();

    assert_eq!(stats.entries_processed, 2);
    assert_eq!(stats.failed_flushes, 1);
    assert_eq!(stats.prices_dropped, 1);
    assert_eq!(stats.prices_inserted, 1);
    assert_eq!(stats.retries, 3);

    let rows = common::history(&sync.store().inner);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["card_id"], "card-3");
}

#[test]
fn failed_lookup_is_counted_and_run_moves_on() {
    let data = json!({
        KEY_SHARED: ck_entry(json!({"normal": {"2025-01-01": 2.0}}), Value::Null),
        UUID_PRICED: ck_entry(json!({"normal": {"2025-07-01": 3.0}}), Value::Null),
    });
    let store = FailingStore::new(common::sample_store(), StoreErrorKind::Network).failing_selects(3);
    let config = common::test_config().match_strategy(MatchStrategy::Lazy);
    let mut sync = PriceSync::new(store, config, fixed());
    let stats = sync.run(&feed(data)).unwrap();

    assert_eq!(stats.entries_processed, 2);
    assert_eq!(stats.lookups_failed, 1);
    assert_eq!(stats.retries, 3);
    assert_eq!(stats.unmatched, 0);
    assert_eq!(stats.cards_updated, 1);
    assert!(stats.to_string().contains("Lookups failed:      1"));

    let rows = common::history(&sync.store().inner);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["card_id"], "card-3");
}

#[test]
fn periodic_refresh_rebuilds_the_client() {
    let data = json!({
        KEY_SHARED: ck_entry(json!({"normal": {"2025-01-01": 2.0}}), Value::Null),
        UUID_UNKNOWN: ck_entry(json!({"normal": {"2025-01-01": 1.0}}), Value::Null),
    });
    let store = FailingStore::new(common::sample_store(), StoreErrorKind::Network);
    let config = common::test_config().refresh_every(1);
    let mut sync = PriceSync::new(store, config, fixed());
    let stats = sync.run(&feed(data)).unwrap();
    assert_eq!(stats.reconnects, 2);
    assert_eq!(sync.store().reconnects, 2);
}

#[test]
fn reconcile_repairs_dropped_projections() {
    let data = json!({
        KEY_SHARED: ck_entry(json!({"normal": {"2025-01-01": 2.0}}), Value::Null),
    });
    let store = FailingStore::new(common::sample_store(), StoreErrorKind::Network).failing_updates(1);
    let mut sync = PriceSync::new(store, common::test_config(), fixed());
    let stats = sync.run(&feed(data)).unwrap();
    assert_eq!(stats.projections_failed, 1);
    assert!(common::card(&sync.store().inner, "card-1")["ck_buy_usd"].is_null());

    let report = sync.reconcile().unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(common::card(&sync.store().inner, "card-1")["ck_buy_usd"], 2.0);
}
