//! The MTGJSON price feed: loading, CDN caching, and read-only access.
//!
//! `AllPrices` and `AllPricesToday` share one shape:
//!
//! ```text
//! { "meta": {...},
//!   "data": { <uuid>: { "paper": { <provider>: {
//!       "buylist": { <finish>: { <ISO date>: <amount> } },
//!       "retail":  { <finish>: { <ISO date>: <amount> } } } } } } }
//! ```
//!
//! Any missing or non-object level below `data` means "no price data" for
//! that entry; it is never an error.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use serde_json::{Map, Value};

use crate::config::{self, FeedKind};
use crate::error::{Result, SyncError};
use crate::models::{Finish, PriceType};

// ---------------------------------------------------------------------------
// PriceFeed
// ---------------------------------------------------------------------------

/// A parsed price document.
#[derive(Debug, Clone, Default)]
pub struct PriceFeed {
    pub meta: Option<Value>,
    pub data: Map<String, Value>,
}

impl PriceFeed {
    /// Parse a feed file, gunzipping it when the name ends in `.gz`.
    ///
    /// An unreadable or unparseable file is a fatal error for the run.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path)?;
        let value: Value = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            serde_json::from_reader(BufReader::new(GzDecoder::new(BufReader::new(file))))?
        } else {
            serde_json::from_reader(BufReader::new(file))?
        };
        let feed = Self::from_value(value);
        tracing::info!(path = %path.display(), entries = feed.len(), "loaded price feed");
        Ok(feed)
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut top) => {
                let meta = top.remove("meta");
                let data = match top.remove("data") {
                    Some(Value::Object(data)) => data,
                    Some(_) | None => {
                        tracing::warn!("price feed has no 'data' object, treating it as empty");
                        Map::new()
                    }
                };
                Self { meta, data }
            }
            _ => {
                tracing::warn!("price feed is not a JSON object, treating it as empty");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Entries in the document's iteration order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Build date from `meta.date`, if present.
    pub fn meta_date(&self) -> Option<&str> {
        self.meta.as_ref()?.get("date")?.as_str()
    }
}

// ---------------------------------------------------------------------------
// ProviderPrices
// ---------------------------------------------------------------------------

/// One provider's block (`paper.<provider>`) of a feed entry.
#[derive(Debug, Clone, Copy)]
pub struct ProviderPrices<'a> {
    block: &'a Map<String, Value>,
}

impl<'a> ProviderPrices<'a> {
    /// The `{date: amount}` series for a price type and finish.
    pub fn series(&self, price_type: PriceType, finish: Finish) -> Option<&'a Map<String, Value>> {
        self.block
            .get(price_type.feed_section())?
            .as_object()?
            .get(finish.feed_key())?
            .as_object()
    }
}

/// Locate `paper.<provider>` inside an entry.
///
/// Returns `None` when the block is missing, not an object, or empty.
pub fn provider_prices<'a>(entry: &'a Value, provider: &str) -> Option<ProviderPrices<'a>> {
    let block = entry.get("paper")?.get(provider)?.as_object()?;
    if block.is_empty() {
        return None;
    }
    Some(ProviderPrices { block })
}

// ---------------------------------------------------------------------------
// FeedCache
// ---------------------------------------------------------------------------

/// Downloads and caches the MTGJSON price documents.
///
/// Checks `Meta.json` for version changes and re-downloads when stale.
pub struct FeedCache {
    /// Directory where cached files are stored.
    pub cache_dir: PathBuf,
    /// If true, never download (use cached files only).
    pub offline: bool,
    timeout: Duration,
    client: Option<Client>,
    remote_ver: Option<String>,
}

impl FeedCache {
    /// Create a feed cache, creating `cache_dir` (or the default) if needed.
    pub fn new(cache_dir: Option<PathBuf>, offline: bool, timeout: Duration) -> Result<Self> {
        let dir = cache_dir.unwrap_or_else(config::default_cache_dir);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            cache_dir: dir,
            offline,
            timeout,
            client: None,
            remote_ver: None,
        })
    }

    fn client(&mut self) -> Result<Client> {
        if self.client.is_none() {
            self.client = Some(
                Client::builder()
                    .timeout(self.timeout)
                    .redirect(reqwest::redirect::Policy::limited(10))
                    .build()?,
            );
        }
        self.client
            .clone()
            .ok_or_else(|| SyncError::NotFound("HTTP client unavailable".to_string()))
    }

    /// Where the MTGJSON version of a cached feed file is recorded.
    ///
    /// Each file keeps its own record: `AllPricesToday` is refreshed far more
    /// often than `AllPrices`.
    pub fn version_path(&self, kind: FeedKind) -> PathBuf {
        self.cache_dir.join(format!("version-{}.txt", kind.file_name()))
    }

    /// Version recorded when `kind` was last downloaded.
    pub fn local_version(&self, kind: FeedKind) -> Option<String> {
        fs::read_to_string(self.version_path(kind))
            .ok()
            .map(|s| s.trim().to_string())
    }

    fn save_version(&self, kind: FeedKind, version: &str) {
        if let Err(e) = fs::write(self.version_path(kind), version) {
            tracing::warn!(file = kind.file_name(), error = %e, "could not record feed version");
        }
    }

    /// Current MTGJSON version from `Meta.json`, or `None` if offline or unreachable.
    pub fn remote_version(&mut self) -> Result<Option<String>> {
        if self.remote_ver.is_some() {
            return Ok(self.remote_ver.clone());
        }
        if self.offline {
            return Ok(None);
        }
        let client = self.client()?;
        match client.get(config::META_URL).send() {
            Ok(resp) => {
                let data: Value = resp.error_for_status()?.json()?;
                let version = data
                    .get("data")
                    .and_then(|d| d.get("version"))
                    .or_else(|| data.get("meta").and_then(|m| m.get("version")))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                self.remote_ver = version.clone();
                Ok(version)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch MTGJSON version");
                Ok(None)
            }
        }
    }

    /// `true` if `kind` was never downloaded or the CDN has a newer version.
    pub fn is_stale(&mut self, kind: FeedKind) -> Result<bool> {
        match self.local_version(kind) {
            None => Ok(true),
            Some(local) => match self.remote_version()? {
                None => Ok(false),
                Some(remote) => Ok(local != remote),
            },
        }
    }

    /// Download to a temp file and rename on success, so an interrupted
    /// download never leaves a truncated feed behind.
    fn download_file(&mut self, filename: &str, dest: &Path) -> Result<()> {
        let url = format!("{}/{}", config::CDN_BASE, filename);
        tracing::info!(%url, "downloading price feed");

        let tmp_dest = dest.with_extension("gz.tmp");
        let client = self.client()?;
        let result = (|| -> Result<()> {
            let mut resp = client.get(&url).send()?.error_for_status()?;
            let mut out = fs::File::create(&tmp_dest)?;
            resp.copy_to(&mut out)?;
            fs::rename(&tmp_dest, dest)?;
            Ok(())
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp_dest);
        }
        result
    }

    /// Ensure the feed is cached locally, downloading if needed.
    pub fn ensure_feed(&mut self, kind: FeedKind) -> Result<PathBuf> {
        let filename = kind.file_name();
        let local_path = self.cache_dir.join(filename);

        if !local_path.exists() || self.is_stale(kind)? {
            if self.offline {
                if local_path.exists() {
                    return Ok(local_path);
                }
                return Err(SyncError::NotFound(format!(
                    "{} not cached and offline mode is enabled",
                    filename
                )));
            }
            self.download_file(filename, &local_path)?;
            if let Ok(Some(version)) = self.remote_version() {
                self.save_version(kind, &version);
            }
        }
        Ok(local_path)
    }

    /// Load a cached (or freshly downloaded) feed.
    ///
    /// A corrupt cached file is deleted so the next call downloads it again.
    pub fn load(&mut self, kind: FeedKind) -> Result<PriceFeed> {
        let path = self.ensure_feed(kind)?;
        match PriceFeed::from_path(&path) {
            Ok(feed) => Ok(feed),
            Err(SyncError::Json(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt cached feed, removing");
                let _ = fs::remove_file(&path);
                Err(SyncError::NotFound(format!(
                    "cached feed '{}' was corrupt and has been removed; retry to re-download ({})",
                    kind.file_name(),
                    e
                )))
            }
            Err(e) => Err(e),
        }
    }
}
