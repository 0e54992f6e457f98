//! Parameter-bound query construction.
//!
//! [`SelectQuery`] appends predicates to a fixed base statement. Column
//! names are `&'static str` so only code-owned identifiers reach the SQL
//! text; every request-supplied value becomes a numbered `$n` parameter.
//! Placeholders are wrapped in `CAST` so the bound value's type wins over
//! whatever the server would infer from the column.

use std::fmt::Write as _;

use leith_map_flood_models::{
    FloodDamageFilter, FloodZoneFilter, GreenspaceFilter, GreenspaceKind, SimdZoneFilter,
};
use switchy_database::{Database, DatabaseValue, Row};

use crate::DbError;

/// A `SELECT` statement under construction together with its bound
/// parameters.
#[derive(Debug)]
pub struct SelectQuery {
    sql: String,
    params: Vec<DatabaseValue>,
}

impl SelectQuery {
    /// Starts from a base statement. The base must already contain a
    /// `WHERE` clause so predicates can be appended with `AND`.
    #[must_use]
    pub fn new(base: &'static str) -> Self {
        Self {
            sql: base.trim_end().to_string(),
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: DatabaseValue) -> usize {
        self.params.push(value);
        self.params.len()
    }

    fn bind_real(&mut self, value: f64) -> String {
        let idx = self.bind(DatabaseValue::Real64(value));
        format!("CAST(${idx} AS DOUBLE PRECISION)")
    }

    fn bind_int(&mut self, value: i32) -> String {
        let idx = self.bind(DatabaseValue::Int32(value));
        format!("CAST(${idx} AS INTEGER)")
    }

    fn bind_text(&mut self, value: String) -> String {
        let idx = self.bind(DatabaseValue::String(value));
        format!("CAST(${idx} AS TEXT)")
    }

    /// Appends a fixed predicate.
    pub fn and(&mut self, predicate: &'static str) -> &mut Self {
        write!(self.sql, " AND {predicate}").unwrap();
        self
    }

    /// `column BETWEEN lo AND hi` on an integer column.
    pub fn between(&mut self, column: &'static str, lo: i32, hi: i32) -> &mut Self {
        let lo = self.bind_int(lo);
        let hi = self.bind_int(hi);
        write!(self.sql, " AND {column} BETWEEN {lo} AND {hi}").unwrap();
        self
    }

    /// Inclusive numeric bounds. An absent bound adds nothing.
    pub fn range(&mut self, column: &'static str, min: Option<f64>, max: Option<f64>) -> &mut Self {
        if let Some(min) = min {
            let p = self.bind_real(min);
            write!(self.sql, " AND {column} >= {p}").unwrap();
        }
        if let Some(max) = max {
            let p = self.bind_real(max);
            write!(self.sql, " AND {column} <= {p}").unwrap();
        }
        self
    }

    /// `column LIKE pattern`, with the pattern bound as-is.
    pub fn like(&mut self, column: &'static str, pattern: &str) -> &mut Self {
        let p = self.bind_text(pattern.to_string());
        write!(self.sql, " AND {column} LIKE {p}").unwrap();
        self
    }

    /// Case-insensitive substring match. `LIKE` wildcards in `needle` are
    /// escaped so they match literally.
    pub fn contains_ci(&mut self, column: &'static str, needle: &str) -> &mut Self {
        let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
        let p = self.bind_text(pattern);
        write!(self.sql, " AND LOWER({column}) LIKE {p}").unwrap();
        self
    }

    /// Case-insensitive membership in a fixed list of names.
    pub fn in_ci(&mut self, column: &'static str, values: &[&str]) -> &mut Self {
        if values.is_empty() {
            return self.and("1 = 0");
        }
        let placeholders: Vec<String> = values
            .iter()
            .map(|v| self.bind_text(v.to_lowercase()))
            .collect();
        write!(
            self.sql,
            " AND LOWER({column}) IN ({})",
            placeholders.join(", ")
        )
        .unwrap();
        self
    }

    /// Orders by `column` descending.
    pub fn order_by_desc(&mut self, column: &'static str) -> &mut Self {
        write!(self.sql, " ORDER BY {column} DESC").unwrap();
        self
    }

    /// Caps the number of rows returned.
    pub fn limit(&mut self, n: i64) -> &mut Self {
        let idx = self.bind(DatabaseValue::Int64(n));
        write!(self.sql, " LIMIT ${idx}").unwrap();
        self
    }

    /// The SQL text built so far.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The bound parameters, in placeholder order.
    #[must_use]
    pub fn params(&self) -> &[DatabaseValue] {
        &self.params
    }

    /// Executes the query.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the database operation fails.
    pub async fn fetch(&self, db: &dyn Database) -> Result<Vec<Row>, DbError> {
        log::debug!("query: {} ({} params)", self.sql, self.params.len());
        Ok(db.query_raw_params(&self.sql, &self.params).await?)
    }
}

/// Escapes `\`, `%` and `_` for use inside a `LIKE` pattern.
#[must_use]
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Applies the SIMD zone filters: risk band, then explicit decile bounds.
pub fn apply_simd_zone_filter(query: &mut SelectQuery, filter: &SimdZoneFilter) {
    if let Some(level) = filter.risk_level {
        let (lo, hi) = level.decile_range();
        query.between("simd_decile", lo, hi);
    }
    query.range("simd_decile", filter.min_decile, filter.max_decile);
}

/// Applies the greenspace filters.
pub fn apply_greenspace_filter(query: &mut SelectQuery, filter: &GreenspaceFilter) {
    match filter.kind {
        Some(GreenspaceKind::Key) => {
            query.and("is_key_greenspace = 1");
        }
        Some(GreenspaceKind::Other) => {
            query.and("(is_key_greenspace = 0 OR is_key_greenspace IS NULL)");
        }
        None => {}
    }
    query.range("storage_volume_m3", filter.min_storage, filter.max_storage);
}

/// Applies the flood zone depth filter.
pub fn apply_flood_zone_filter(query: &mut SelectQuery, filter: &FloodZoneFilter) {
    if let Some(depth) = filter.depth {
        query.like("depth_band", depth.like_pattern());
    }
}

/// Applies the flood damage filters.
pub fn apply_flood_damage_filter(query: &mut SelectQuery, filter: &FloodDamageFilter) {
    if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
        query.contains_ci("building_category", category);
    }
    query.range(
        "protection_value_pound",
        filter.min_value,
        filter.max_value,
    );
}
