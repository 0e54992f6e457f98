//! Builds `GeoJSON` features from dataset rows.
//!
//! Each row is turned into a `Result<Feature, SkipReason>`; a failing row
//! is dropped and counted, never propagated. [`Assembly`] folds the
//! per-row results and keeps a bounded sample of failure messages for the
//! log.

use geojson::{Feature, FeatureCollection, JsonObject};
use leith_map_flood_models::{
    FloodDamageRow, FloodZoneRow, GreenspaceRow, SimdZoneRow, StoredGeometry, StudyAreaRow,
};
use serde_json::{Value, json};

use crate::models3d;
use crate::normalize::{self, NormalizeError};

/// Maximum number of failures logged individually per assembly.
pub const FAILURE_SAMPLE_LIMIT: usize = 5;

/// A dataset row that can be projected onto a `GeoJSON` feature.
pub trait DatasetRow {
    /// Dataset name used in log lines.
    const DATASET: &'static str;

    /// The raw geometry column.
    fn stored_geometry(&self) -> Option<&StoredGeometry>;

    /// The feature properties for this row.
    fn properties(&self) -> JsonObject;
}

/// Why a row produced no feature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    /// The geometry column was null.
    #[error("geometry column is null")]
    NoGeometry,

    /// The geometry column could not be normalized.
    #[error(transparent)]
    Geometry(#[from] NormalizeError),
}

/// Turns one row into a feature.
///
/// # Errors
///
/// Returns [`SkipReason`] if the row has no usable geometry.
pub fn assemble_row<R: DatasetRow>(row: &R) -> Result<Feature, SkipReason> {
    let stored = row.stored_geometry().ok_or(SkipReason::NoGeometry)?;
    let geometry = normalize::normalize(stored)?;

    Ok(Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(row.properties()),
        foreign_members: None,
    })
}

/// Accumulated result of assembling a batch of rows.
#[derive(Debug, Default)]
pub struct Assembly {
    /// Successfully built features, in row order.
    pub features: Vec<Feature>,
    /// Number of rows that produced no feature.
    pub dropped: usize,
    /// The first few failure messages.
    pub samples: Vec<String>,
}

impl Assembly {
    /// Records one row's result. Returns `true` if a feature was added.
    pub fn record(&mut self, dataset: &str, result: Result<Feature, SkipReason>) -> bool {
        match result {
            Ok(feature) => {
                self.features.push(feature);
                true
            }
            Err(reason) => {
                self.dropped += 1;
                if self.samples.len() < FAILURE_SAMPLE_LIMIT {
                    log::warn!("{dataset}: dropping row: {reason}");
                    self.samples.push(reason.to_string());
                }
                false
            }
        }
    }

    /// Logs the build summary for this batch.
    pub fn log_summary(&self, dataset: &str) {
        log::info!(
            "{dataset} features built: {}, failed: {}",
            self.features.len(),
            self.dropped
        );
    }

    /// Wraps the features in a collection. `metadata`, when given, is
    /// emitted as a top-level `metadata` member.
    #[must_use]
    pub fn into_collection(self, metadata: Option<JsonObject>) -> FeatureCollection {
        let foreign_members = metadata.map(|m| {
            let mut members = JsonObject::new();
            members.insert("metadata".to_string(), Value::Object(m));
            members
        });

        FeatureCollection {
            bbox: None,
            features: self.features,
            foreign_members,
        }
    }
}

/// Assembles every row, dropping the ones that fail.
pub fn assemble<'a, R, I>(rows: I) -> Assembly
where
    R: DatasetRow + 'a,
    I: IntoIterator<Item = &'a R>,
{
    let mut assembly = Assembly::default();
    for row in rows {
        assembly.record(R::DATASET, assemble_row(row));
    }
    assembly.log_summary(R::DATASET);
    assembly
}

/// Running max / min of protection values over assembled damage rows.
///
/// The minimum ignores zero and missing values; with no positive values
/// both ends report `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProtectionRange {
    max: f64,
    min: Option<f64>,
}

impl ProtectionRange {
    /// Folds one protection value into the range.
    pub fn observe(&mut self, value: f64) {
        if value > self.max {
            self.max = value;
        }
        if value > 0.0 && self.min.is_none_or(|min| value < min) {
            self.min = Some(value);
        }
    }

    /// Largest value seen, or `0`.
    #[must_use]
    pub const fn max(&self) -> f64 {
        self.max
    }

    /// Smallest strictly positive value seen, or `0`.
    #[must_use]
    pub fn min(&self) -> f64 {
        self.min.unwrap_or(0.0)
    }
}

/// Assembles flood damage rows and computes the protection range over
/// the rows that made it into the collection.
pub fn assemble_flood_damage(rows: &[FloodDamageRow]) -> (Assembly, ProtectionRange) {
    let mut assembly = Assembly::default();
    let mut range = ProtectionRange::default();

    for row in rows {
        if assembly.record(FloodDamageRow::DATASET, assemble_row(row)) {
            range.observe(row.protection_value_pound.unwrap_or(0.0));
        }
    }

    assembly.log_summary(FloodDamageRow::DATASET);
    (assembly, range)
}

fn object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

impl DatasetRow for StudyAreaRow {
    const DATASET: &'static str = "study_area";

    fn stored_geometry(&self) -> Option<&StoredGeometry> {
        self.geometry.as_ref()
    }

    fn properties(&self) -> JsonObject {
        object(json!({
            "area_id": self.area_id,
            "area_name": self.area_name,
            "pva_reference": self.pva_reference,
        }))
    }
}

impl DatasetRow for SimdZoneRow {
    const DATASET: &'static str = "simd_zones";

    fn stored_geometry(&self) -> Option<&StoredGeometry> {
        self.geometry.as_ref()
    }

    fn properties(&self) -> JsonObject {
        object(json!({
            "simd_zone_id": self.simd_zone_id,
            "datazone_code": self.datazone_code,
            "datazone_name": self.datazone_name,
            "simd_decile": self.simd_decile,
            "risk_index": self.risk_index.unwrap_or(0.0),
            "simd_rank": self.simd_rank,
        }))
    }
}

impl DatasetRow for GreenspaceRow {
    const DATASET: &'static str = "greenspaces";

    fn stored_geometry(&self) -> Option<&StoredGeometry> {
        self.geometry.as_ref()
    }

    fn properties(&self) -> JsonObject {
        let model_path = greenspace_model_path(self);
        object(json!({
            "greenspace_id": self.greenspace_id,
            "name": self.name,
            "function_type": self.function_type,
            "storage_volume_m3": self.storage_volume_m3.unwrap_or(0.0),
            "is_key_greenspace": self.is_key_greenspace,
            "has_3d_model": model_path.is_some(),
            "model_path": model_path,
        }))
    }
}

/// Looks up the 3D model for a greenspace row. Only key greenspaces have
/// models.
#[must_use]
pub fn greenspace_model_path(row: &GreenspaceRow) -> Option<String> {
    if !row.is_key_greenspace {
        return None;
    }
    row.name.as_deref().and_then(models3d::model_path)
}

impl DatasetRow for FloodZoneRow {
    const DATASET: &'static str = "flood_zones";

    fn stored_geometry(&self) -> Option<&StoredGeometry> {
        self.geometry.as_ref()
    }

    fn properties(&self) -> JsonObject {
        object(json!({
            "zone_id": self.zone_id,
            "probability": self.probability,
            "depth_band": self.depth_band,
            "scenario": self.scenario,
        }))
    }
}

impl DatasetRow for FloodDamageRow {
    const DATASET: &'static str = "flood_damage";

    fn stored_geometry(&self) -> Option<&StoredGeometry> {
        self.geometry.as_ref()
    }

    fn properties(&self) -> JsonObject {
        object(json!({
            "damage_id": self.damage_id,
            "building_id": self.building_id,
            "building_category": self.building_category,
            "flood_depth_m": self.flood_depth_m.unwrap_or(0.0),
            "damage_2024_pound": self.damage_2024_pound.unwrap_or(0.0),
            "damage_protected_pound": self.damage_protected_pound.unwrap_or(0.0),
            "protection_value_pound": self.protection_value_pound.unwrap_or(0.0),
        }))
    }
}
