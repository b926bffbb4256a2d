//! PostgREST-over-HTTP [`Store`] (the hosted Supabase database).
//!
//! Talks to `{url}/rest/v1/{table}` with the service key in both the
//! `apikey` and bearer headers. Failures are classified into a
//! [`StoreErrorKind`] from the HTTP status and PostgREST's JSON `code`, so
//! callers never inspect message text.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use crate::config::StoreCredentials;
use crate::error::{StoreError, StoreErrorKind, StoreResult};
use crate::store::{Filter, Row, Store};

/// PostgREST codes meaning the server's schema cache does not know a
/// column, table or function it should.
const STALE_SCHEMA_CODES: &[&str] = &["PGRST202", "PGRST204", "PGRST205"];

pub struct RestStore {
    base_url: String,
    key: String,
    timeout: Duration,
    client: Option<Client>,
}

impl RestStore {
    pub fn new(credentials: &StoreCredentials, timeout: Duration) -> Self {
        Self {
            base_url: credentials.url.trim_end_matches('/').to_string(),
            key: credentials.key.clone(),
            timeout,
            client: None,
        }
    }

    /// Lazy HTTP client, created on first use and after [`Store::invalidate`].
    fn client(&mut self) -> StoreResult<&Client> {
        if self.client.is_none() {
            let mut headers = HeaderMap::new();
            let key = HeaderValue::from_str(&self.key)
                .map_err(|_| StoreError::new(StoreErrorKind::Auth, "store key is not a valid header value"))?;
            let bearer = HeaderValue::from_str(&format!("Bearer {}", self.key))
                .map_err(|_| StoreError::new(StoreErrorKind::Auth, "store key is not a valid header value"))?;
            headers.insert("apikey", key);
            headers.insert(AUTHORIZATION, bearer);

            let client = Client::builder()
                .timeout(self.timeout)
                .default_headers(headers)
                .build()?;
            self.client = Some(client);
        }
        self.client
            .as_ref()
            .ok_or_else(|| StoreError::new(StoreErrorKind::Network, "HTTP client unavailable"))
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

impl Store for RestStore {
    fn select(&mut self, table: &str, columns: &[&str], filter: &Filter) -> StoreResult<Vec<Row>> {
        let url = self.table_url(table);
        let select = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(",")
        };
        let mut query = vec![("select".to_string(), select)];
        query.extend(filter_query(filter));

        let client = self.client()?.clone();
        let resp = client.get(&url).query(&query).send()?;
        Ok(check(resp)?.json::<Vec<Row>>()?)
    }

    fn upsert(&mut self, table: &str, rows: &[Row], conflict_key: &[&str]) -> StoreResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let url = self.table_url(table);
        let client = self.client()?.clone();
        let resp = client
            .post(&url)
            .query(&[("on_conflict", conflict_key.join(","))])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()?;
        check(resp)?;
        Ok(rows.len())
    }

    fn update(&mut self, table: &str, patch: &Row, filter: &Filter) -> StoreResult<usize> {
        if filter.eq.is_empty() {
            // PostgREST refuses unfiltered PATCH; refuse locally with a clearer message.
            return Err(StoreError::new(
                StoreErrorKind::Rejected,
                "update without a filter is not allowed",
            ));
        }
        let url = self.table_url(table);
        let client = self.client()?.clone();
        let resp = client
            .patch(&url)
            .query(&filter_query(filter))
            .header("Prefer", "return=representation")
            .json(patch)
            .send()?;
        let updated: Vec<Value> = check(resp)?.json()?;
        Ok(updated.len())
    }

    fn invalidate(&mut self) {
        self.client = None;
    }

    fn reconnect(&mut self) -> StoreResult<()> {
        self.invalidate();
        self.client()?;
        tracing::debug!(url = %self.base_url, "rebuilt store client");
        Ok(())
    }
}

/// PostgREST query parameters for a filter: `col=eq.v`, `order=`, `limit=`, `offset=`.
pub fn filter_query(filter: &Filter) -> Vec<(String, String)> {
    let mut query: Vec<(String, String)> = filter
        .eq
        .iter()
        .map(|(column, value)| {
            let op = match value {
                Value::Null => "is.null".to_string(),
                Value::String(s) => format!("eq.{}", s),
                other => format!("eq.{}", other),
            };
            (column.clone(), op)
        })
        .collect();

    if !filter.order.is_empty() {
        let order: Vec<String> = filter.order.iter().map(|c| format!("{}.asc", c)).collect();
        query.push(("order".to_string(), order.join(",")));
    }
    if let Some(n) = filter.limit {
        query.push(("limit".to_string(), n.to_string()));
    }
    if let Some(n) = filter.offset {
        query.push(("offset".to_string(), n.to_string()));
    }
    query
}

/// Classify a non-2xx PostgREST response.
pub fn classify_failure(status: u16, body: &str) -> StoreError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(|c| c.as_str());
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string());

    let kind = match code {
        Some(c) if STALE_SCHEMA_CODES.contains(&c) => StoreErrorKind::StaleSchema,
        _ => match status {
            401 | 403 => StoreErrorKind::Auth,
            408 | 429 | 500..=599 => StoreErrorKind::Unavailable,
            _ => StoreErrorKind::Rejected,
        },
    };

    let message = match code {
        Some(c) => format!("HTTP {} [{}]: {}", status, c, message),
        None => format!("HTTP {}: {}", status, message),
    };
    StoreError::new(kind, message)
}

fn check(resp: Response) -> StoreResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(classify_failure(status.as_u16(), &body))
}
