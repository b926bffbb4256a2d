//! Local DuckDB-backed [`Store`].
//!
//! Holds the same `cards` and `price_history` tables as the hosted store so
//! imports can run offline, against a file, or in memory for tests. Dates are
//! kept as ISO `VARCHAR`s, matching what the REST store hands back.

use std::path::{Path, PathBuf};

use ::duckdb::types::{Value as DuckValue, ValueRef};
use ::duckdb::{Connection as DuckDbConnection, ToSql};
use serde_json::Value;

use crate::error::{StoreError, StoreErrorKind, StoreResult};
use crate::sql_builder::{is_identifier, update_sql, upsert_sql, SqlBuilder};
use crate::store::{Filter, Row, Store};

/// Tables created on open if missing.
pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS cards (
    id VARCHAR PRIMARY KEY,
    name VARCHAR,
    set_code VARCHAR,
    mtgjson_uuid VARCHAR,
    is_foil BOOLEAN DEFAULT FALSE,
    ck_buy_usd DOUBLE,
    ck_buy_brl DOUBLE,
    ck_retail_usd DOUBLE,
    ck_retail_brl DOUBLE,
    ck_last_update VARCHAR
);
CREATE TABLE IF NOT EXISTS price_history (
    card_id VARCHAR NOT NULL,
    source VARCHAR NOT NULL,
    price_type VARCHAR NOT NULL,
    price_raw DOUBLE,
    currency VARCHAR,
    fx_rate_to_brl DOUBLE,
    price_brl DOUBLE,
    scraped_at VARCHAR NOT NULL,
    UNIQUE (card_id, source, scraped_at, price_type)
);
";

pub struct DuckDbStore {
    conn: DuckDbConnection,
    path: Option<PathBuf>,
}

impl DuckDbStore {
    /// Open a private in-memory database with the schema in place.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(DuckDbConnection::open_in_memory()?, None)
    }

    /// Open (or create) a database file with the schema in place.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        Self::init(DuckDbConnection::open(&path)?, Some(path))
    }

    fn init(conn: DuckDbConnection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn, path })
    }

    /// Database file, or `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Return a reference to the raw DuckDB connection for advanced usage.
    pub fn raw(&self) -> &DuckDbConnection {
        &self.conn
    }

    /// Execute SQL and return results as JSON rows.
    pub fn execute(&self, sql: &str, params: &[Value]) -> StoreResult<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let bound: Vec<DuckValue> = params.iter().map(to_duck_value).collect();
        let refs: Vec<&dyn ToSql> = bound.iter().map(|p| p as &dyn ToSql).collect();

        let mut rows = stmt.query(refs.as_slice())?;

        // Column metadata is only available once the query has run.
        let column_names: Vec<String> = rows
            .as_ref()
            .map(|s| s.column_names().into_iter().map(|n| n.to_string()).collect())
            .unwrap_or_default();

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = Row::new();
            for (i, name) in column_names.iter().enumerate() {
                map.insert(name.clone(), convert_value_ref(row.get_ref(i)?));
            }
            out.push(map);
        }
        Ok(out)
    }

    /// Execute SQL and return the first column of the first row.
    pub fn execute_scalar(&self, sql: &str, params: &[Value]) -> StoreResult<Option<Value>> {
        Ok(self
            .execute(sql, params)?
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next().map(|(_, v)| v)))
    }

    /// Row count of `table`.
    pub fn count(&self, table: &str) -> StoreResult<i64> {
        check_identifiers(&[table])?;
        let n = self.execute_scalar(&format!("SELECT COUNT(*) FROM {}", table), &[])?;
        Ok(n.and_then(|v| v.as_i64()).unwrap_or(0))
    }
}

impl Store for DuckDbStore {
    fn select(&mut self, table: &str, columns: &[&str], filter: &Filter) -> StoreResult<Vec<Row>> {
        check_identifiers(&[table])?;
        check_identifiers(columns)?;
        let mut qb = SqlBuilder::new(table);
        if !columns.is_empty() {
            qb.select(columns);
        }
        for (column, value) in &filter.eq {
            check_identifiers(&[column.as_str()])?;
            qb.where_eq(column, value.clone());
        }
        let order: Vec<String> = filter.order.iter().map(|c| format!("{} ASC", c)).collect();
        let order_refs: Vec<&str> = order.iter().map(String::as_str).collect();
        check_identifiers(&filter.order.iter().map(String::as_str).collect::<Vec<_>>())?;
        qb.order_by(&order_refs);
        if let Some(n) = filter.limit {
            qb.limit(n);
        }
        if let Some(n) = filter.offset {
            qb.offset(n);
        }
        let (sql, params) = qb.build();
        self.execute(&sql, &params)
    }

    fn upsert(&mut self, table: &str, rows: &[Row], conflict_key: &[&str]) -> StoreResult<usize> {
        check_identifiers(&[table])?;
        check_identifiers(conflict_key)?;
        if rows.is_empty() {
            return Ok(0);
        }

        // One transaction per call: the batch lands entirely or not at all.
        let tx = self.conn.transaction()?;
        for row in rows {
            let columns: Vec<&str> = row.keys().map(String::as_str).collect();
            check_identifiers(&columns)?;
            let sql = upsert_sql(table, &columns, conflict_key);
            let bound: Vec<DuckValue> = row.values().map(to_duck_value).collect();
            let refs: Vec<&dyn ToSql> = bound.iter().map(|p| p as &dyn ToSql).collect();
            let mut stmt = tx.prepare_cached(&sql)?;
            stmt.execute(refs.as_slice())?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn update(&mut self, table: &str, patch: &Row, filter: &Filter) -> StoreResult<usize> {
        check_identifiers(&[table])?;
        if patch.is_empty() {
            return Ok(0);
        }
        let set_columns: Vec<&str> = patch.keys().map(String::as_str).collect();
        let where_columns: Vec<&str> = filter.eq.iter().map(|(c, _)| c.as_str()).collect();
        check_identifiers(&set_columns)?;
        check_identifiers(&where_columns)?;
        if filter.eq.iter().any(|(_, v)| v.is_null()) {
            return Err(StoreError::new(
                StoreErrorKind::Rejected,
                "update filters must not compare against null",
            ));
        }

        let sql = update_sql(table, &set_columns, &where_columns);
        let bound: Vec<DuckValue> = patch
            .values()
            .chain(filter.eq.iter().map(|(_, v)| v))
            .map(to_duck_value)
            .collect();
        let refs: Vec<&dyn ToSql> = bound.iter().map(|p| p as &dyn ToSql).collect();
        Ok(self.conn.execute(&sql, refs.as_slice())?)
    }

    fn invalidate(&mut self) {
        if let Err(e) = self.reconnect() {
            tracing::warn!(error = %e, "could not reopen DuckDB connection");
        }
    }

    fn reconnect(&mut self) -> StoreResult<()> {
        // A cloned handle shares the database, so in-memory data survives.
        self.conn = self.conn.try_clone()?;
        tracing::debug!(path = ?self.path, "reopened DuckDB connection");
        Ok(())
    }
}

fn check_identifiers(names: &[&str]) -> StoreResult<()> {
    match names.iter().find(|n| !is_identifier(n)) {
        Some(bad) => Err(StoreError::new(
            StoreErrorKind::Rejected,
            format!("invalid identifier: '{}'", bad),
        )),
        None => Ok(()),
    }
}

/// Convert a JSON value to a DuckDB parameter value.
fn to_duck_value(v: &Value) -> DuckValue {
    match v {
        Value::Null => DuckValue::Null,
        Value::Bool(b) => DuckValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => DuckValue::BigInt(i),
            None => DuckValue::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => DuckValue::Text(s.clone()),
        other => DuckValue::Text(other.to_string()),
    }
}

/// Convert a DuckDB `ValueRef` to a `serde_json::Value`.
fn convert_value_ref(val: ValueRef<'_>) -> Value {
    match val {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(n) => Value::Number(n.into()),
        ValueRef::SmallInt(n) => Value::Number(n.into()),
        ValueRef::Int(n) => Value::Number(n.into()),
        ValueRef::BigInt(n) => Value::Number(n.into()),
        ValueRef::HugeInt(n) => {
            // HugeInt may not fit in i64; fall back to a string
            if let Ok(i) = i64::try_from(n) {
                Value::Number(i.into())
            } else {
                Value::String(n.to_string())
            }
        }
        ValueRef::Float(f) => serde_json::Number::from_f64(f as f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Double(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).to_string()),
        _ => Value::Null,
    }
}
