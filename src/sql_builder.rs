//! SQL construction for the local DuckDB store.
//!
//! All values go through DuckDB's parameter binding (`?` placeholders), never
//! through string interpolation. Table and column names are interpolated, so
//! they are checked with [`is_identifier`] before use.
//!
//! # Example
//!
//! ```rust
//! use mtg_price_sync::SqlBuilder;
//! let (sql, params) = SqlBuilder::new("cards")
//!     .select(&["id", "is_foil"])
//!     .where_eq("mtgjson_uuid", "0000aaaa-0000-0000-0000-000000000000")
//!     .order_by(&["id ASC"])
//!     .limit(10)
//!     .build();
//! assert!(sql.ends_with("LIMIT 10"));
//! assert_eq!(params.len(), 1);
//! ```

use serde_json::Value;

/// `true` if `name` is a plain `[A-Za-z_][A-Za-z0-9_]*` identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Builds parameterized SELECT queries. Methods return `&mut Self` for chaining.
pub struct SqlBuilder {
    select_cols: Vec<String>,
    from_table: String,
    where_clauses: Vec<String>,
    params: Vec<Value>,
    order_by_cols: Vec<String>,
    limit_val: Option<usize>,
    offset_val: Option<usize>,
}

impl SqlBuilder {
    /// Create a builder targeting the given table.
    pub fn new(table: &str) -> Self {
        Self {
            select_cols: vec!["*".to_string()],
            from_table: table.to_string(),
            where_clauses: Vec::new(),
            params: Vec::new(),
            order_by_cols: Vec::new(),
            limit_val: None,
            offset_val: None,
        }
    }

    /// Set the columns to select (replaces the default `*`).
    pub fn select(&mut self, cols: &[&str]) -> &mut Self {
        self.select_cols = cols.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Add an equality condition: `{column} = ?`.
    ///
    /// A JSON `null` value becomes `{column} IS NULL` with no parameter.
    pub fn where_eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        if value.is_null() {
            self.where_clauses.push(format!("{} IS NULL", column));
        } else {
            self.where_clauses.push(format!("{} = ?", column));
            self.params.push(value);
        }
        self
    }

    /// Add ORDER BY clauses (e.g. `"card_id ASC"`).
    pub fn order_by(&mut self, clauses: &[&str]) -> &mut Self {
        self.order_by_cols
            .extend(clauses.iter().map(|c| c.to_string()));
        self
    }

    /// Set the maximum number of rows to return.
    pub fn limit(&mut self, n: usize) -> &mut Self {
        self.limit_val = Some(n);
        self
    }

    /// Set the number of rows to skip before returning results.
    pub fn offset(&mut self, n: usize) -> &mut Self {
        self.offset_val = Some(n);
        self
    }

    /// Build the final SQL string and parameter list.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut parts = vec![
            format!("SELECT {}", self.select_cols.join(", ")),
            format!("FROM {}", self.from_table),
        ];

        if !self.where_clauses.is_empty() {
            parts.push(format!("WHERE {}", self.where_clauses.join(" AND ")));
        }

        if !self.order_by_cols.is_empty() {
            parts.push(format!("ORDER BY {}", self.order_by_cols.join(", ")));
        }

        if let Some(n) = self.limit_val {
            parts.push(format!("LIMIT {}", n));
        }

        if let Some(n) = self.offset_val {
            parts.push(format!("OFFSET {}", n));
        }

        (parts.join("\n"), self.params.clone())
    }
}

/// `INSERT ... ON CONFLICT (..) DO UPDATE` for one row of `columns`.
///
/// Columns outside the conflict target are overwritten from `EXCLUDED`; if
/// every column is part of the key the statement becomes `DO NOTHING`.
pub fn upsert_sql(table: &str, columns: &[&str], conflict_key: &[&str]) -> String {
    let placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !conflict_key.contains(c))
        .map(|c| format!("{} = EXCLUDED.{}", c, c))
        .collect();
    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        table,
        columns.join(", "),
        placeholders.join(", "),
        conflict_key.join(", "),
        action
    )
}

/// `UPDATE {table} SET a = ?, b = ? WHERE x = ? AND y = ?`.
pub fn update_sql(table: &str, set_columns: &[&str], where_columns: &[&str]) -> String {
    let sets: Vec<String> = set_columns.iter().map(|c| format!("{} = ?", c)).collect();
    let mut sql = format!("UPDATE {} SET {}", table, sets.join(", "));
    if !where_columns.is_empty() {
        let conds: Vec<String> = where_columns.iter().map(|c| format!("{} = ?", c)).collect();
        sql.push_str(&format!(" WHERE {}", conds.join(" AND ")));
    }
    sql
}
