//! Storage contract consumed by the pipeline.
//!
//! The store offers per-call atomicity only: `select`, bulk `upsert` keyed on
//! a conflict target, and filtered `update`. Two backends exist:
//! [`RestStore`] talks to a hosted PostgREST endpoint over HTTP, and
//! [`DuckDbStore`] keeps the same tables in a local DuckDB database.

pub mod duckdb;
pub mod rest;

pub use self::duckdb::DuckDbStore;
pub use self::rest::RestStore;

use serde_json::Value;

use crate::error::StoreResult;

/// A row as exchanged with the store: column name to JSON value.
pub type Row = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Equality filter plus ordering and an optional limit/offset window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub eq: Vec<(String, Value)>,
    pub order: Vec<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Filter {
    /// Match every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::default().and_eq(column, value)
    }

    pub fn and_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.eq.push((column.to_string(), value.into()));
        self
    }

    /// Ascending order on the given columns. Required for stable paging.
    pub fn order_by(mut self, columns: &[&str]) -> Self {
        self.order = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Select/upsert/update over named tables.
///
/// Methods take `&mut self`: the pipeline is single-threaded and the
/// connection is process-wide state that may be rebuilt in place.
pub trait Store {
    fn select(&mut self, table: &str, columns: &[&str], filter: &Filter) -> StoreResult<Vec<Row>>;

    /// Insert `rows`, overwriting any existing row that collides on
    /// `conflict_key`. Returns the number of rows written.
    fn upsert(&mut self, table: &str, rows: &[Row], conflict_key: &[&str]) -> StoreResult<usize>;

    /// Apply `patch` to every row matching `filter`. Returns rows affected.
    fn update(&mut self, table: &str, patch: &Row, filter: &Filter) -> StoreResult<usize>;

    /// Drop the current client; the next call builds a fresh one.
    fn invalidate(&mut self);

    /// Drop and immediately rebuild the client.
    fn reconnect(&mut self) -> StoreResult<()>;
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn select(&mut self, table: &str, columns: &[&str], filter: &Filter) -> StoreResult<Vec<Row>> {
        (**self).select(table, columns, filter)
    }

    fn upsert(&mut self, table: &str, rows: &[Row], conflict_key: &[&str]) -> StoreResult<usize> {
        (**self).upsert(table, rows, conflict_key)
    }

    fn update(&mut self, table: &str, patch: &Row, filter: &Filter) -> StoreResult<usize> {
        (**self).update(table, patch, filter)
    }

    fn invalidate(&mut self) {
        (**self).invalidate()
    }

    fn reconnect(&mut self) -> StoreResult<()> {
        (**self).reconnect()
    }
}

/// Select every matching row, `page_size` rows per call.
///
/// `filter` should carry an ordering so pages do not overlap; its own
/// limit/offset are replaced.
pub fn select_paged<S: Store + ?Sized>(
    store: &mut S,
    table: &str,
    columns: &[&str],
    filter: &Filter,
    page_size: usize,
) -> StoreResult<Vec<Row>> {
    let mut out = Vec::new();
    for_each_page(store, table, columns, filter, page_size, |page| out.extend(page))?;
    Ok(out)
}

/// Hand every matching row to `on_page`, one page at a time, without
/// holding the whole result.
///
/// A server may cap rows per response below `page_size` (PostgREST
/// `max-rows`), so a short first page is taken as that cap and confirmed
/// with one more request. Otherwise a page shorter than the page size in
/// effect, or an empty one, ends the scan. Returns the number of rows seen.
pub fn for_each_page<S, F>(
    store: &mut S,
    table: &str,
    columns: &[&str],
    filter: &Filter,
    page_size: usize,
    mut on_page: F,
) -> StoreResult<usize>
where
    S: Store + ?Sized,
    F: FnMut(Vec<Row>),
{
    let page_size = page_size.max(1);
    let mut cap: Option<usize> = None;
    let mut offset = 0;
    loop {
        let page = store.select(table, columns, &filter.clone().page(page_size, offset))?;
        let n = page.len();
        if n == 0 {
            break;
        }
        on_page(page);
        offset += n;
        match cap {
            Some(c) if n < c => break,
            None if n < page_size && offset > n => break,
            None if n < page_size => cap = Some(n),
            _ => {}
        }
    }
    Ok(offset)
}
