#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Dataset row types and filter vocabularies for the Water of Leith flood
//! map.
//!
//! Rows mirror the five tables of the flood-modelling store (`STUDY_AREA`,
//! `SIMD_ZONE`, `GREENSPACE`, `FLOOD_ZONE`, `FLOOD_DAMAGE`). Every row
//! carries its geometry column untouched as a [`StoredGeometry`]; turning
//! that into `GeoJSON` is the job of `leith_map_geometry`.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A geometry value exactly as it came out of a geometry column.
///
/// The column may hold a `GeoJSON` geometry, a `GeoJSON` `Feature`, or a bare
/// coordinate ring, either as text or as raw bytes from a large-object read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredGeometry {
    /// Textual column content.
    Text(String),
    /// Binary column content, expected to be UTF-8.
    Bytes(Vec<u8>),
    /// The column was present but could not be converted; carries the
    /// conversion error.
    Unreadable(String),
}

impl From<String> for StoredGeometry {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for StoredGeometry {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for StoredGeometry {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// Deprivation risk band for SIMD data zones.
///
/// SIMD deciles run from 1 (most deprived) to 10 (least deprived); the
/// most deprived zones are the highest flood-impact risk.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskLevel {
    /// Deciles 1-3
    High,
    /// Deciles 4-7
    Medium,
    /// Deciles 8-10
    Low,
}

impl RiskLevel {
    /// Returns the inclusive SIMD decile range covered by this band.
    #[must_use]
    pub const fn decile_range(self) -> (i32, i32) {
        match self {
            Self::High => (1, 3),
            Self::Medium => (4, 7),
            Self::Low => (8, 10),
        }
    }
}

/// Modelled flood depth band.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DepthBand {
    /// Below 0.3 m
    Shallow,
    /// Between 0.3 m and 1.0 m
    Medium,
    /// Above 1.0 m
    Deep,
}

impl DepthBand {
    /// Returns the `LIKE` pattern matching this band's `depth_band` labels.
    #[must_use]
    pub const fn like_pattern(self) -> &'static str {
        match self {
            Self::Shallow => "%< 0.3%",
            Self::Medium => "%0.3%1.0%",
            Self::Deep => "%> 1.0%",
        }
    }
}

/// Greenspace classification used by the `type` filter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GreenspaceKind {
    /// Greenspaces flagged as key flood-storage sites.
    Key,
    /// Everything else, including rows with no flag.
    Other,
}

/// Datasets that can be exported as CSV or JSON.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExportType {
    /// Per-building damage and protection values.
    FloodDamage,
    /// Greenspace storage volumes.
    Greenspaces,
    /// SIMD data zones.
    SimdZones,
    /// Five headline metrics.
    Summary,
}

impl ExportType {
    /// Returns the download file name (without extension).
    #[must_use]
    pub const fn file_stem(self) -> &'static str {
        match self {
            Self::FloodDamage => "flood_damage_data",
            Self::Greenspaces => "greenspace_data",
            Self::SimdZones => "simd_zone_data",
            Self::Summary => "summary_statistics",
        }
    }
}

/// Output encoding for an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values with a header line.
    #[default]
    Csv,
    /// Array of objects keyed by column name.
    Json,
}

impl ExportFormat {
    /// Resolves the `format` query parameter. Only `json` selects JSON;
    /// anything else (including absence) falls back to CSV.
    #[must_use]
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Csv,
        }
    }
}

/// A row from `STUDY_AREA`.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyAreaRow {
    /// Primary key.
    pub area_id: Option<i64>,
    /// Display name.
    pub area_name: Option<String>,
    /// Potentially Vulnerable Area reference.
    pub pva_reference: Option<String>,
    /// Raw geometry column.
    pub geometry: Option<StoredGeometry>,
}

/// A row from `SIMD_ZONE`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimdZoneRow {
    /// Primary key.
    pub simd_zone_id: Option<i64>,
    /// Data zone code (e.g. `S01008765`).
    pub datazone_code: Option<String>,
    /// Data zone name.
    pub datazone_name: Option<String>,
    /// SIMD decile, 1 (most deprived) to 10.
    pub simd_decile: Option<i32>,
    /// Composite flood risk index.
    pub risk_index: Option<f64>,
    /// SIMD rank.
    pub simd_rank: Option<i64>,
    /// Raw geometry column.
    pub geometry: Option<StoredGeometry>,
}

/// A row from `GREENSPACE`.
#[derive(Debug, Clone, PartialEq)]
pub struct GreenspaceRow {
    /// Primary key.
    pub greenspace_id: Option<i64>,
    /// Greenspace name.
    pub name: Option<String>,
    /// Primary function (park, golf course, ...).
    pub function_type: Option<String>,
    /// Modelled flood storage volume in cubic metres.
    pub storage_volume_m3: Option<f64>,
    /// Whether this is a key flood-storage greenspace.
    pub is_key_greenspace: bool,
    /// Raw geometry column. Always `None` for ranking queries.
    pub geometry: Option<StoredGeometry>,
}

/// A row from `FLOOD_ZONE`.
#[derive(Debug, Clone, PartialEq)]
pub struct FloodZoneRow {
    /// Primary key.
    pub zone_id: Option<i64>,
    /// Return-period probability label.
    pub probability: Option<String>,
    /// Depth band label, e.g. `0.3 - 1.0m`.
    pub depth_band: Option<String>,
    /// Modelled scenario.
    pub scenario: Option<String>,
    /// Raw geometry column.
    pub geometry: Option<StoredGeometry>,
}

/// A row from `FLOOD_DAMAGE`.
#[derive(Debug, Clone, PartialEq)]
pub struct FloodDamageRow {
    /// Primary key.
    pub damage_id: Option<i64>,
    /// Building reference.
    pub building_id: Option<String>,
    /// Building use category.
    pub building_category: Option<String>,
    /// Modelled flood depth in metres.
    pub flood_depth_m: Option<f64>,
    /// Damage without protection, 2024 prices.
    pub damage_2024_pound: Option<f64>,
    /// Residual damage with protection in place.
    pub damage_protected_pound: Option<f64>,
    /// Damage avoided by protection.
    pub protection_value_pound: Option<f64>,
    /// Raw geometry column.
    pub geometry: Option<StoredGeometry>,
}

/// Filters accepted by the SIMD zone listing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimdZoneFilter {
    /// Decile band.
    pub risk_level: Option<RiskLevel>,
    /// Inclusive lower decile bound.
    pub min_decile: Option<f64>,
    /// Inclusive upper decile bound.
    pub max_decile: Option<f64>,
}

/// Filters accepted by the greenspace listing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GreenspaceFilter {
    /// Key / other classification.
    pub kind: Option<GreenspaceKind>,
    /// Inclusive lower storage bound (m³).
    pub min_storage: Option<f64>,
    /// Inclusive upper storage bound (m³).
    pub max_storage: Option<f64>,
}

/// Filters accepted by the flood zone listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FloodZoneFilter {
    /// Depth band.
    pub depth: Option<DepthBand>,
}

/// Filters accepted by the flood damage listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloodDamageFilter {
    /// Case-insensitive substring of `building_category`.
    pub category: Option<String>,
    /// Inclusive lower protection value bound (£).
    pub min_value: Option<f64>,
    /// Inclusive upper protection value bound (£).
    pub max_value: Option<f64>,
}

/// Headline totals across the damage, greenspace and SIMD tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryTotals {
    /// Number of damaged buildings.
    pub affected_buildings: i64,
    /// Total unprotected damage (£).
    pub total_damage_2024: f64,
    /// Total residual damage with protection (£).
    pub total_damage_protected: f64,
    /// Total damage avoided (£).
    pub total_protection_value: f64,
    /// Storage volume of the key greenspaces (m³).
    pub total_storage_m3: f64,
    /// Number of key greenspaces found.
    pub greenspace_count: i64,
    /// Number of SIMD data zones.
    pub simd_zone_count: i64,
    /// Protection value as a percentage of total damage.
    pub protection_percentage: f64,
}

/// Damage totals for one building category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDamage {
    /// Building category (may be null in the source data).
    pub category: Option<String>,
    /// Number of buildings.
    pub count: i64,
    /// Sum of unprotected damage (£).
    pub total_damage: f64,
    /// Sum of protection value (£).
    pub total_protection: f64,
}
