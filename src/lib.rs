//! Incremental MTG card-price sync.
//!
//! Reads the MTGJSON price feed (`AllPrices` or `AllPricesToday`), matches
//! each entry to local card variants, writes normalized observations to an
//! append-only `price_history` table, and keeps the latest buy and retail
//! price denormalized on `cards`. The storage backend is a [`Store`]: either
//! a PostgREST/Supabase endpoint ([`RestStore`]) or a local DuckDB file
//! ([`DuckDbStore`]).
//!
//! # Quick start
//!
//! ```no_run
//! use mtg_price_sync::{fx, DuckDbStore, PriceFeed, PriceSync, SyncConfig};
//!
//! let config = SyncConfig::default().dry_run(true).max_cards(Some(100));
//! let fx = fx::resolver_for(&config.mode, config.fixed_rate, &config.fx_url);
//! let store = DuckDbStore::open("prices.duckdb").unwrap();
//! let feed = PriceFeed::from_path("AllPricesToday.json.gz").unwrap();
//!
//! let mut sync = PriceSync::new(store, config, fx);
//! let stats = sync.run(&feed).unwrap();
//! println!("{}", stats);
//! ```

pub mod buffer;
pub mod builder;
pub mod config;
pub mod error;
pub mod feed;
pub mod fx;
pub mod listing;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod projector;
pub mod reconcile;
pub mod retry;
pub mod sql_builder;
pub mod store;
pub mod uuid;

pub use config::{ImportMode, MatchStrategy, StoreCredentials, SyncConfig};
pub use error::{Result, StoreError, StoreErrorKind, StoreResult, SyncError};
pub use feed::{FeedCache, PriceFeed};
pub use models::{Outcome, RunStatistics, SkipReason};
pub use pipeline::PriceSync;
pub use reconcile::ReconcileReport;
pub use retry::RetryPolicy;
pub use sql_builder::SqlBuilder;
pub use store::{DuckDbStore, RestStore, Store};
pub use uuid::normalize_uuid;
