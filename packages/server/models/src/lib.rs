#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the flood map server.
//!
//! Query parameters arrive as raw strings and are parsed leniently: a
//! value that does not parse is treated as absent rather than rejected.
//! Response types are separate from the database row types so the API
//! contract can evolve independently.

use leith_map_flood_models::{
    DepthBand, FloodDamageFilter, FloodZoneFilter, GreenspaceFilter, GreenspaceKind,
    GreenspaceRow, RiskLevel, SimdZoneFilter,
};
use leith_map_geometry::assemble::greenspace_model_path;
use serde::{Deserialize, Serialize};

/// Ranking size when `limit` is absent or not an integer.
pub const DEFAULT_RANKING_LIMIT: i64 = 10;

/// Parses a finite number, ignoring surrounding whitespace.
#[must_use]
pub fn parse_number(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn parse_enum<T: std::str::FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|v| v.trim().to_lowercase().parse().ok())
}

/// Query parameters for `GET /api/simd_zones`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimdZoneParams {
    /// `high`, `medium` or `low`.
    pub risk_level: Option<String>,
    /// Minimum decile.
    pub min: Option<String>,
    /// Maximum decile.
    pub max: Option<String>,
}

impl SimdZoneParams {
    /// Converts to a store filter.
    #[must_use]
    pub fn to_filter(&self) -> SimdZoneFilter {
        SimdZoneFilter {
            risk_level: parse_enum::<RiskLevel>(self.risk_level.as_deref()),
            min_decile: parse_number(self.min.as_deref()),
            max_decile: parse_number(self.max.as_deref()),
        }
    }
}

/// Query parameters for `GET /api/greenspaces`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GreenspaceParams {
    /// `key` or `other`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Minimum storage volume in m³.
    pub min_storage: Option<String>,
    /// Maximum storage volume in m³.
    pub max_storage: Option<String>,
}

impl GreenspaceParams {
    /// Converts to a store filter.
    #[must_use]
    pub fn to_filter(&self) -> GreenspaceFilter {
        GreenspaceFilter {
            kind: parse_enum::<GreenspaceKind>(self.kind.as_deref()),
            min_storage: parse_number(self.min_storage.as_deref()),
            max_storage: parse_number(self.max_storage.as_deref()),
        }
    }
}

/// Query parameters for `GET /api/flood_zones`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FloodZoneParams {
    /// `shallow`, `medium` or `deep`.
    pub depth: Option<String>,
}

impl FloodZoneParams {
    /// Converts to a store filter.
    #[must_use]
    pub fn to_filter(&self) -> FloodZoneFilter {
        FloodZoneFilter {
            depth: parse_enum::<DepthBand>(self.depth.as_deref()),
        }
    }
}

/// Query parameters for `GET /api/flood_damage`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FloodDamageParams {
    /// Building category substring.
    #[serde(rename = "type")]
    pub category: Option<String>,
    /// Minimum protection value in pounds.
    pub min_value: Option<String>,
    /// Maximum protection value in pounds.
    pub max_value: Option<String>,
}

impl FloodDamageParams {
    /// Converts to a store filter.
    #[must_use]
    pub fn to_filter(&self) -> FloodDamageFilter {
        FloodDamageFilter {
            category: self
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(ToString::to_string),
            min_value: parse_number(self.min_value.as_deref()),
            max_value: parse_number(self.max_value.as_deref()),
        }
    }
}

/// Query parameters for `GET /api/greenspace_ranking`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RankingParams {
    /// Number of rows to return.
    pub limit: Option<String>,
}

impl RankingParams {
    /// Requested limit, or [`DEFAULT_RANKING_LIMIT`]. Clamping happens in
    /// the query layer.
    #[must_use]
    pub fn limit(&self) -> i64 {
        self.limit
            .as_deref()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_RANKING_LIMIT)
    }
}

/// Query parameters for `GET /api/export/{type}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportParams {
    /// `csv` (default) or `json`.
    pub format: Option<String>,
}

/// Query parameters for `GET /api/postcodes`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostcodeListParams {
    /// `affected` or `unaffected`.
    pub filter: Option<String>,
}

/// Query parameters for `GET /api/postcode/search`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostcodeSearchParams {
    /// Postcode to look up.
    pub postcode: Option<String>,
}

/// One entry of the greenspace storage ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRankedGreenspace {
    /// Greenspace identifier.
    pub greenspace_id: Option<i64>,
    /// Site name.
    pub name: Option<String>,
    /// Land use, e.g. `Public Park`.
    pub function_type: Option<String>,
    /// Flood storage volume in cubic metres; `0` when unknown.
    pub storage_volume_m3: f64,
    /// Whether the site is a key flood-storage greenspace.
    pub is_key_greenspace: bool,
    /// Whether a 3D model viewer exists for the site.
    pub has_3d_model: bool,
}

impl From<GreenspaceRow> for ApiRankedGreenspace {
    fn from(row: GreenspaceRow) -> Self {
        let has_3d_model = greenspace_model_path(&row).is_some();
        Self {
            greenspace_id: row.greenspace_id,
            name: row.name,
            function_type: row.function_type,
            storage_volume_m3: row.storage_volume_m3.unwrap_or(0.0),
            is_key_greenspace: row.is_key_greenspace,
            has_3d_model,
        }
    }
}

/// A successful postcode lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPostcodeHit {
    /// Always `true`.
    pub found: bool,
    /// Postcode as stored.
    pub postcode: String,
    /// Postcode district, e.g. `EH11`.
    pub district: serde_json::Value,
    /// Postcode sector, e.g. `EH11 2`.
    pub sector: serde_json::Value,
    /// Boundary in WGS84.
    pub geometry: Option<geojson::Geometry>,
    /// Buildings with modelled flood damage; `0` when absent.
    pub affected_buildings: serde_json::Value,
    /// Total modelled damage in pounds; `0` when absent.
    pub total_damage: serde_json::Value,
    /// Damage avoided by greenspace storage in pounds; `0` when absent.
    pub protection_value: serde_json::Value,
    /// Reserved for per-building detail; currently always empty.
    pub buildings: Vec<serde_json::Value>,
}

/// A postcode lookup with no match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPostcodeMiss {
    /// Always `false`.
    pub found: bool,
    /// The normalized search term.
    pub postcode: String,
    /// Human-readable reason.
    pub message: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// `healthy` or `unhealthy`.
    pub status: String,
    /// `connected` or `disconnected`.
    pub database: String,
    /// Server version. Only reported when healthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// `GET /api` index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiIndex {
    /// Service name.
    pub name: String,
    /// Crate version.
    pub version: String,
    /// Feature descriptions.
    pub features: Vec<String>,
    /// Available endpoint paths.
    pub endpoints: Vec<String>,
}
