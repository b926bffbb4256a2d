use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mtg_price_sync::config::{FeedKind, ImportMode, MatchStrategy};
use mtg_price_sync::{
    fx, DuckDbStore, FeedCache, PriceFeed, PriceSync, RestStore, Store, StoreCredentials,
    SyncConfig,
};
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser, Debug)]
#[command(name = "price-sync", version, about = "MTGJSON price importer and reconciler")]
struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Log what would be written without touching the store
    #[arg(long, global = true)]
    dry_run: bool,
    /// Use a local DuckDB file instead of the Supabase REST endpoint
    #[arg(long, global = true)]
    duckdb: Option<PathBuf>,
    /// Observations per bulk upsert
    #[arg(long, global = true)]
    batch_size: Option<usize>,
}

#[derive(Args, Debug)]
struct ImportOpts {
    /// Read the feed from this file (plain or .gz) instead of the CDN cache
    #[arg(long)]
    feed: Option<PathBuf>,
    /// Stop after this many feed entries
    #[arg(long)]
    max_cards: Option<usize>,
    /// Look up cards one UUID at a time instead of preloading the table
    #[arg(long)]
    lazy_match: bool,
    /// Skip updating the latest-price columns on cards
    #[arg(long)]
    no_project: bool,
    /// Never download; use cached feed files only
    #[arg(long)]
    offline: bool,
    /// Override the feed cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Import the full price history (AllPrices) at a fixed rate
    Import {
        #[command(flatten)]
        opts: ImportOpts,
        /// USD to BRL rate applied to every date
        #[arg(long)]
        rate: Option<f64>,
    },
    /// Import one day (AllPricesToday) using the day's exchange rate
    Daily {
        #[command(flatten)]
        opts: ImportOpts,
        /// ISO date to import (defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Rebuild latest prices on cards from price_history
    Reconcile,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing("info")?;

    let mut config = SyncConfig::from_env().context("loading configuration")?;
    let dry_run = config.dry_run || cli.opts.dry_run;
    config = config.dry_run(dry_run);
    if let Some(n) = cli.opts.batch_size {
        config = config.batch_size(n);
    }

    let store = open_store(cli.opts.duckdb.as_ref())?;

    match cli.command {
        Commands::Import { opts, rate } => {
            if let Some(rate) = rate {
                config = config.fixed_rate(rate);
            }
            config = apply_import_opts(config.mode(ImportMode::History), &opts);
            config.validate()?;
            let feed = load_feed(&config, &opts, FeedKind::AllPrices)?;
            run_import(store, config, &feed)
        }
        Commands::Daily { opts, date } => {
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive().format("%Y-%m-%d").to_string());
            config = apply_import_opts(config.mode(ImportMode::Daily { date }), &opts);
            config.validate()?;
            let feed = load_feed(&config, &opts, FeedKind::AllPricesToday)?;
            run_import(store, config, &feed)
        }
        Commands::Reconcile => {
            let fx = fx::resolver_for(&ImportMode::History, config.fixed_rate, &config.fx_url);
            let mut sync = PriceSync::new(store, config, fx);
            let report = sync.reconcile().context("reconcile pass failed")?;
            println!(
                "Reconciled {} cards from {} rows ({} updated, {} failed, {} rows ignored)",
                report.cards, report.rows_scanned, report.updated, report.failed, report.rows_ignored
            );
            Ok(())
        }
    }
}

fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}

fn apply_import_opts(mut config: SyncConfig, opts: &ImportOpts) -> SyncConfig {
    if let Some(path) = &opts.feed {
        config = config.feed_path(path);
    }
    if opts.max_cards.is_some() {
        config = config.max_cards(opts.max_cards);
    }
    if opts.lazy_match {
        config = config.match_strategy(MatchStrategy::Lazy);
    }
    if opts.no_project {
        config = config.project_latest(false);
    }
    config
}

fn open_store(duckdb: Option<&PathBuf>) -> Result<Box<dyn Store>> {
    match duckdb {
        Some(path) => {
            let store = DuckDbStore::open(path)
                .with_context(|| format!("opening DuckDB store at {}", path.display()))?;
            tracing::info!(path = %path.display(), "using local DuckDB store");
            Ok(Box::new(store))
        }
        None => {
            let creds = StoreCredentials::from_env().context("missing Supabase credentials")?;
            tracing::info!(url = %creds.url, "using Supabase REST store");
            Ok(Box::new(RestStore::new(&creds, HTTP_TIMEOUT)))
        }
    }
}

fn load_feed(config: &SyncConfig, opts: &ImportOpts, kind: FeedKind) -> Result<PriceFeed> {
    if let Some(path) = &config.feed_path {
        tracing::info!(path = %path.display(), "loading price feed");
        return PriceFeed::from_path(path).with_context(|| format!("reading feed {}", path.display()));
    }
    let mut cache = FeedCache::new(opts.cache_dir.clone(), opts.offline, HTTP_TIMEOUT)?;
    cache
        .load(kind)
        .with_context(|| format!("loading {} from cache", kind.file_name()))
}

fn run_import(store: Box<dyn Store>, config: SyncConfig, feed: &PriceFeed) -> Result<()> {
    if config.dry_run {
        tracing::warn!("dry run: nothing will be written");
    }
    if let Some(date) = feed.meta_date() {
        tracing::info!(feed_date = date, entries = feed.len(), "feed loaded");
    }
    let fx = fx::resolver_for(&config.mode, config.fixed_rate, &config.fx_url);
    let mut sync = PriceSync::new(store, config, fx);
    let stats = sync.run(feed).context("price import failed")?;
    println!("{}", stats);
    Ok(())
}
