//! Dataset, aggregate and export queries.
//!
//! Numeric columns are cast to `DOUBLE PRECISION` / `BIGINT` in the SQL so
//! row conversion does not depend on how the upstream schema declared
//! them. Conversion failures on individual columns degrade to `None`
//! rather than failing the row.
//!
//! Geometry columns are selected as `CAST(geom_json AS TEXT)`, which covers
//! `text`, `json`, `jsonb` and `bytea` storage alike. Postgres renders
//! `bytea` as `\x`-prefixed hex, which is decoded back to the raw bytes.

use leith_map_flood_models::{
    CategoryDamage, ExportType, FloodDamageFilter, FloodDamageRow, FloodZoneFilter, FloodZoneRow,
    GreenspaceFilter, GreenspaceRow, SimdZoneFilter, SimdZoneRow, StoredGeometry, StudyAreaRow,
    SummaryTotals,
};
use moosicbox_json_utils::database::ToValue as _;
use serde_json::Value;
use switchy_database::{Database, Row};

use crate::DbError;
use crate::filter::{
    SelectQuery, apply_flood_damage_filter, apply_flood_zone_filter, apply_greenspace_filter,
    apply_simd_zone_filter,
};

/// Key flood-storage greenspaces counted by the summary.
pub const SUMMARY_GREENSPACES: &[&str] = &[
    "spylaw public park",
    "colinton and craiglockhart dells",
    "hailes quarry park",
    "saughton allotments",
    "saughton sports complex",
    "saughton rose gardens",
    "saughton park and gardens",
    "murray field",
    "roseburn public park",
];

/// Reported when there is no damage total to compute a percentage from.
pub const FALLBACK_PROTECTION_PERCENTAGE: f64 = 73.0;

/// Largest ranking size a caller may request.
pub const MAX_RANKING_LIMIT: i64 = 1000;

/// Prefix Postgres puts on `bytea` values in hex output format.
const BYTEA_HEX_PREFIX: &str = "\\x";

fn geometry(row: &Row) -> Option<StoredGeometry> {
    match row.to_value::<Option<String>>("geom_json") {
        Ok(value) => value.map(stored_geometry),
        Err(e) => {
            let err = DbError::Conversion {
                message: format!("geom_json: {e}"),
            };
            Some(StoredGeometry::Unreadable(err.to_string()))
        }
    }
}

/// Classifies the text form of a geometry column. Hex-encoded `bytea`
/// output becomes [`StoredGeometry::Bytes`]; anything else is text.
fn stored_geometry(text: String) -> StoredGeometry {
    match text
        .strip_prefix(BYTEA_HEX_PREFIX)
        .and_then(|hex| hex::decode(hex).ok())
    {
        Some(bytes) => StoredGeometry::Bytes(bytes),
        None => StoredGeometry::Text(text),
    }
}

/// Verifies the connection answers a trivial query.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn ping(db: &dyn Database) -> Result<(), DbError> {
    db.query_raw_params("SELECT 1 AS ok", &[]).await?;
    Ok(())
}

/// Fetches the study area outline(s).
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn fetch_study_area(db: &dyn Database) -> Result<Vec<StudyAreaRow>, DbError> {
    let query = SelectQuery::new(
        "SELECT CAST(area_id AS BIGINT) AS area_id, area_name, pva_reference,
                CAST(geom_json AS TEXT) AS geom_json
         FROM STUDY_AREA
         WHERE geom_json IS NOT NULL",
    );

    let rows = query.fetch(db).await?;
    log::debug!("study_area rows fetched: {}", rows.len());

    Ok(rows
        .iter()
        .map(|row| StudyAreaRow {
            area_id: row.to_value("area_id").unwrap_or(None),
            area_name: row.to_value("area_name").unwrap_or(None),
            pva_reference: row.to_value("pva_reference").unwrap_or(None),
            geometry: geometry(row),
        })
        .collect())
}

/// Fetches SIMD data zones matching `filter`.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn fetch_simd_zones(
    db: &dyn Database,
    filter: &SimdZoneFilter,
) -> Result<Vec<SimdZoneRow>, DbError> {
    let mut query = SelectQuery::new(
        "SELECT CAST(simd_zone_id AS BIGINT) AS simd_zone_id, datazone_code, datazone_name,
                CAST(simd_decile AS INTEGER) AS simd_decile,
                CAST(risk_index AS DOUBLE PRECISION) AS risk_index,
                CAST(simd_rank AS BIGINT) AS simd_rank,
                CAST(geom_json AS TEXT) AS geom_json
         FROM SIMD_ZONE
         WHERE geom_json IS NOT NULL",
    );
    apply_simd_zone_filter(&mut query, filter);

    let rows = query.fetch(db).await?;

    Ok(rows
        .iter()
        .map(|row| SimdZoneRow {
            simd_zone_id: row.to_value("simd_zone_id").unwrap_or(None),
            datazone_code: row.to_value("datazone_code").unwrap_or(None),
            datazone_name: row.to_value("datazone_name").unwrap_or(None),
            simd_decile: row.to_value("simd_decile").unwrap_or(None),
            risk_index: row.to_value("risk_index").unwrap_or(None),
            simd_rank: row.to_value("simd_rank").unwrap_or(None),
            geometry: geometry(row),
        })
        .collect())
}

fn greenspace_row(row: &Row, with_geometry: bool) -> GreenspaceRow {
    let is_key: i32 = row.to_value("is_key_greenspace").unwrap_or(0);
    GreenspaceRow {
        greenspace_id: row.to_value("greenspace_id").unwrap_or(None),
        name: row.to_value("name").unwrap_or(None),
        function_type: row.to_value("function_type").unwrap_or(None),
        storage_volume_m3: row.to_value("storage_volume_m3").unwrap_or(None),
        is_key_greenspace: is_key != 0,
        geometry: if with_geometry { geometry(row) } else { None },
    }
}

/// Fetches greenspaces matching `filter`.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn fetch_greenspaces(
    db: &dyn Database,
    filter: &GreenspaceFilter,
) -> Result<Vec<GreenspaceRow>, DbError> {
    let mut query = SelectQuery::new(
        "SELECT CAST(greenspace_id AS BIGINT) AS greenspace_id, name, function_type,
                CAST(storage_volume_m3 AS DOUBLE PRECISION) AS storage_volume_m3,
                CAST(COALESCE(is_key_greenspace, 0) AS INTEGER) AS is_key_greenspace,
                CAST(geom_json AS TEXT) AS geom_json
         FROM GREENSPACE
         WHERE geom_json IS NOT NULL",
    );
    apply_greenspace_filter(&mut query, filter);

    let rows = query.fetch(db).await?;
    Ok(rows.iter().map(|row| greenspace_row(row, true)).collect())
}

/// Fetches flood extent polygons matching `filter`.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn fetch_flood_zones(
    db: &dyn Database,
    filter: &FloodZoneFilter,
) -> Result<Vec<FloodZoneRow>, DbError> {
    let mut query = SelectQuery::new(
        "SELECT CAST(zone_id AS BIGINT) AS zone_id,
                CAST(probability AS TEXT) AS probability,
                depth_band, scenario, CAST(geom_json AS TEXT) AS geom_json
         FROM FLOOD_ZONE
         WHERE geom_json IS NOT NULL",
    );
    apply_flood_zone_filter(&mut query, filter);

    let rows = query.fetch(db).await?;

    Ok(rows
        .iter()
        .map(|row| FloodZoneRow {
            zone_id: row.to_value("zone_id").unwrap_or(None),
            probability: row.to_value("probability").unwrap_or(None),
            depth_band: row.to_value("depth_band").unwrap_or(None),
            scenario: row.to_value("scenario").unwrap_or(None),
            geometry: geometry(row),
        })
        .collect())
}

/// Fetches damaged buildings matching `filter`.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn fetch_flood_damage(
    db: &dyn Database,
    filter: &FloodDamageFilter,
) -> Result<Vec<FloodDamageRow>, DbError> {
    let mut query = SelectQuery::new(
        "SELECT CAST(damage_id AS BIGINT) AS damage_id,
                CAST(building_id AS TEXT) AS building_id,
                building_category,
                CAST(flood_depth_m AS DOUBLE PRECISION) AS flood_depth_m,
                CAST(damage_2024_pound AS DOUBLE PRECISION) AS damage_2024_pound,
                CAST(damage_protected_pound AS DOUBLE PRECISION) AS damage_protected_pound,
                CAST(protection_value_pound AS DOUBLE PRECISION) AS protection_value_pound,
                CAST(geom_json AS TEXT) AS geom_json
         FROM FLOOD_DAMAGE
         WHERE geom_json IS NOT NULL",
    );
    apply_flood_damage_filter(&mut query, filter);

    let rows = query.fetch(db).await?;

    Ok(rows
        .iter()
        .map(|row| FloodDamageRow {
            damage_id: row.to_value("damage_id").unwrap_or(None),
            building_id: row.to_value("building_id").unwrap_or(None),
            building_category: row.to_value("building_category").unwrap_or(None),
            flood_depth_m: row.to_value("flood_depth_m").unwrap_or(None),
            damage_2024_pound: row.to_value("damage_2024_pound").unwrap_or(None),
            damage_protected_pound: row.to_value("damage_protected_pound").unwrap_or(None),
            protection_value_pound: row.to_value("protection_value_pound").unwrap_or(None),
            geometry: geometry(row),
        })
        .collect())
}

/// Protection value as a percentage of unprotected damage, to one decimal
/// place. Falls back to [`FALLBACK_PROTECTION_PERCENTAGE`] when there is
/// no damage.
#[must_use]
pub fn protection_percentage(total_protection: f64, total_damage: f64) -> f64 {
    if total_damage > 0.0 {
        (total_protection / total_damage * 1000.0).round() / 10.0
    } else {
        FALLBACK_PROTECTION_PERCENTAGE
    }
}

/// Computes the headline totals. Runs three sequential queries.
///
/// # Errors
///
/// Returns [`DbError`] if any database operation fails.
pub async fn fetch_summary(db: &dyn Database) -> Result<SummaryTotals, DbError> {
    let damage = SelectQuery::new(
        "SELECT COUNT(*) AS affected_buildings,
                CAST(SUM(damage_2024_pound) AS DOUBLE PRECISION) AS total_damage_2024,
                CAST(SUM(damage_protected_pound) AS DOUBLE PRECISION) AS total_damage_protected,
                CAST(SUM(protection_value_pound) AS DOUBLE PRECISION) AS total_protection_value
         FROM FLOOD_DAMAGE
         WHERE 1=1",
    )
    .fetch(db)
    .await?;

    let mut greenspace = SelectQuery::new(
        "SELECT CAST(SUM(storage_volume_m3) AS DOUBLE PRECISION) AS total_storage_m3,
                COUNT(*) AS greenspace_count
         FROM GREENSPACE
         WHERE 1=1",
    );
    greenspace.in_ci("name", SUMMARY_GREENSPACES);
    let greenspace = greenspace.fetch(db).await?;

    let simd = SelectQuery::new("SELECT COUNT(*) AS simd_zone_count FROM SIMD_ZONE WHERE 1=1")
        .fetch(db)
        .await?;

    let mut totals = SummaryTotals::default();

    if let Some(row) = damage.first() {
        totals.affected_buildings = row.to_value("affected_buildings").unwrap_or(0);
        totals.total_damage_2024 = row
            .to_value::<Option<f64>>("total_damage_2024")
            .unwrap_or(None)
            .unwrap_or(0.0);
        totals.total_damage_protected = row
            .to_value::<Option<f64>>("total_damage_protected")
            .unwrap_or(None)
            .unwrap_or(0.0);
        totals.total_protection_value = row
            .to_value::<Option<f64>>("total_protection_value")
            .unwrap_or(None)
            .unwrap_or(0.0);
    }

    if let Some(row) = greenspace.first() {
        totals.total_storage_m3 = row
            .to_value::<Option<f64>>("total_storage_m3")
            .unwrap_or(None)
            .unwrap_or(0.0);
        totals.greenspace_count = row.to_value("greenspace_count").unwrap_or(0);
    }

    if let Some(row) = simd.first() {
        totals.simd_zone_count = row.to_value("simd_zone_count").unwrap_or(0);
    }

    totals.protection_percentage =
        protection_percentage(totals.total_protection_value, totals.total_damage_2024);

    Ok(totals)
}

/// Damage totals grouped by building category, largest protection first.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn fetch_damage_by_category(db: &dyn Database) -> Result<Vec<CategoryDamage>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT building_category AS category, COUNT(*) AS count,
                    CAST(SUM(damage_2024_pound) AS DOUBLE PRECISION) AS total_damage,
                    CAST(SUM(protection_value_pound) AS DOUBLE PRECISION) AS total_protection
             FROM FLOOD_DAMAGE
             GROUP BY building_category
             ORDER BY SUM(protection_value_pound) DESC",
            &[],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| CategoryDamage {
            category: row.to_value("category").unwrap_or(None),
            count: row.to_value("count").unwrap_or(0),
            total_damage: row
                .to_value::<Option<f64>>("total_damage")
                .unwrap_or(None)
                .unwrap_or(0.0),
            total_protection: row
                .to_value::<Option<f64>>("total_protection")
                .unwrap_or(None)
                .unwrap_or(0.0),
        })
        .collect())
}

/// Clamps a requested ranking size to `0..=MAX_RANKING_LIMIT`.
#[must_use]
pub fn clamp_ranking_limit(limit: i64) -> i64 {
    limit.clamp(0, MAX_RANKING_LIMIT)
}

/// Greenspaces with a known storage volume, largest first.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn fetch_greenspace_ranking(
    db: &dyn Database,
    limit: i64,
) -> Result<Vec<GreenspaceRow>, DbError> {
    let mut query = SelectQuery::new(
        "SELECT CAST(greenspace_id AS BIGINT) AS greenspace_id, name, function_type,
                CAST(storage_volume_m3 AS DOUBLE PRECISION) AS storage_volume_m3,
                CAST(COALESCE(is_key_greenspace, 0) AS INTEGER) AS is_key_greenspace
         FROM GREENSPACE
         WHERE storage_volume_m3 IS NOT NULL",
    );
    query
        .order_by_desc("storage_volume_m3")
        .limit(clamp_ranking_limit(limit));

    let rows = query.fetch(db).await?;
    Ok(rows.iter().map(|row| greenspace_row(row, false)).collect())
}

/// How an export column is read and rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Whole number.
    Integer,
    /// Floating point.
    Real,
    /// Free text.
    Text,
    /// Floating point that renders as an integer when it has no
    /// fractional part (counts mixed with sums).
    Metric,
}

/// A named export column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportColumn {
    /// Column name, used as CSV header and JSON key.
    pub name: &'static str,
    /// Read / render kind.
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> ExportColumn {
    ExportColumn { name, kind }
}

const FLOOD_DAMAGE_COLUMNS: &[ExportColumn] = &[
    col("damage_id", ColumnKind::Integer),
    col("building_id", ColumnKind::Text),
    col("building_category", ColumnKind::Text),
    col("flood_depth_m", ColumnKind::Real),
    col("damage_2024_pound", ColumnKind::Real),
    col("damage_protected_pound", ColumnKind::Real),
    col("protection_value_pound", ColumnKind::Real),
];

const GREENSPACE_COLUMNS: &[ExportColumn] = &[
    col("greenspace_id", ColumnKind::Integer),
    col("name", ColumnKind::Text),
    col("function_type", ColumnKind::Text),
    col("storage_volume_m3", ColumnKind::Real),
    col("is_key_greenspace", ColumnKind::Integer),
];

const SIMD_ZONE_COLUMNS: &[ExportColumn] = &[
    col("simd_zone_id", ColumnKind::Integer),
    col("datazone_code", ColumnKind::Text),
    col("datazone_name", ColumnKind::Text),
    col("simd_decile", ColumnKind::Integer),
    col("simd_rank", ColumnKind::Integer),
    col("risk_index", ColumnKind::Real),
];

const SUMMARY_COLUMNS: &[ExportColumn] = &[
    col("metric", ColumnKind::Text),
    col("value", ColumnKind::Metric),
];

/// Tabular export data, independent of output format.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    /// Download file name without extension.
    pub file_stem: &'static str,
    /// Column definitions in output order.
    pub columns: &'static [ExportColumn],
    /// One JSON scalar per column per row.
    pub rows: Vec<Vec<Value>>,
}

impl ExportTable {
    /// Column names in output order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }
}

/// Returns the SQL and column layout for an export type.
#[must_use]
pub const fn export_layout(export: ExportType) -> (&'static str, &'static [ExportColumn]) {
    match export {
        ExportType::FloodDamage => (
            "SELECT CAST(damage_id AS BIGINT) AS damage_id,
                    CAST(building_id AS TEXT) AS building_id, building_category,
                    CAST(flood_depth_m AS DOUBLE PRECISION) AS flood_depth_m,
                    CAST(damage_2024_pound AS DOUBLE PRECISION) AS damage_2024_pound,
                    CAST(damage_protected_pound AS DOUBLE PRECISION) AS damage_protected_pound,
                    CAST(protection_value_pound AS DOUBLE PRECISION) AS protection_value_pound
             FROM FLOOD_DAMAGE",
            FLOOD_DAMAGE_COLUMNS,
        ),
        ExportType::Greenspaces => (
            "SELECT CAST(greenspace_id AS BIGINT) AS greenspace_id, name, function_type,
                    CAST(storage_volume_m3 AS DOUBLE PRECISION) AS storage_volume_m3,
                    CAST(is_key_greenspace AS BIGINT) AS is_key_greenspace
             FROM GREENSPACE",
            GREENSPACE_COLUMNS,
        ),
        ExportType::SimdZones => (
            "SELECT CAST(simd_zone_id AS BIGINT) AS simd_zone_id, datazone_code, datazone_name,
                    CAST(simd_decile AS BIGINT) AS simd_decile,
                    CAST(simd_rank AS BIGINT) AS simd_rank,
                    CAST(risk_index AS DOUBLE PRECISION) AS risk_index
             FROM SIMD_ZONE",
            SIMD_ZONE_COLUMNS,
        ),
        ExportType::Summary => (
            "SELECT 'Total Buildings' AS metric, CAST(COUNT(*) AS DOUBLE PRECISION) AS value
             FROM FLOOD_DAMAGE
             UNION ALL
             SELECT 'Total Damage (2024)', CAST(SUM(damage_2024_pound) AS DOUBLE PRECISION)
             FROM FLOOD_DAMAGE
             UNION ALL
             SELECT 'Total Protection Value', CAST(SUM(protection_value_pound) AS DOUBLE PRECISION)
             FROM FLOOD_DAMAGE
             UNION ALL
             SELECT 'Total Greenspaces', CAST(COUNT(*) AS DOUBLE PRECISION)
             FROM GREENSPACE
             UNION ALL
             SELECT 'Total Storage (m3)', CAST(SUM(storage_volume_m3) AS DOUBLE PRECISION)
             FROM GREENSPACE",
            SUMMARY_COLUMNS,
        ),
    }
}

/// Converts one column of a row into a JSON scalar.
fn read_column(row: &Row, column: &ExportColumn) -> Value {
    match column.kind {
        ColumnKind::Integer => row
            .to_value::<Option<i64>>(column.name)
            .unwrap_or(None)
            .map_or(Value::Null, Value::from),
        ColumnKind::Real => row
            .to_value::<Option<f64>>(column.name)
            .unwrap_or(None)
            .map_or(Value::Null, Value::from),
        ColumnKind::Text => row
            .to_value::<Option<String>>(column.name)
            .unwrap_or(None)
            .map_or(Value::Null, Value::from),
        ColumnKind::Metric => row
            .to_value::<Option<f64>>(column.name)
            .unwrap_or(None)
            .map_or(Value::Null, metric_value),
    }
}

/// Renders whole-number metrics as integers.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn metric_value(value: f64) -> Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

/// Fetches the full table for an export type.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn fetch_export(db: &dyn Database, export: ExportType) -> Result<ExportTable, DbError> {
    let (sql, columns) = export_layout(export);
    let rows = db.query_raw_params(sql, &[]).await?;

    Ok(ExportTable {
        file_stem: export.file_stem(),
        columns,
        rows: export_rows(&rows, columns),
    })
}

fn export_rows(rows: &[Row], columns: &[ExportColumn]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|row| columns.iter().map(|c| read_column(row, c)).collect())
        .collect()
}
