#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory postcode boundary lookup.
//!
//! Postcode polygons are read once from a `GeoPackage` layer, reprojected
//! to WGS84, and kept for the lifetime of the process. See [`cache`] for
//! the load-once gate and [`gpkg`] for the file reader.

pub mod cache;
pub mod gpkg;
pub mod osgb;

use std::path::PathBuf;

use geojson::{Feature, FeatureCollection, JsonObject};
use serde_json::Value;

pub use cache::{GeoPackageSource, PostcodeCache, PostcodeSource};

/// Attribute columns carried through from the layer, in output order.
/// Columns missing from the layer are skipped.
pub const ATTRIBUTE_ALLOW_LIST: [&str; 8] = [
    "Postcode",
    "District",
    "Sector",
    "Council",
    "OA22",
    "affected_count",
    "total_damage",
    "protection_value",
];

/// Errors raised while loading the postcode layer.
#[derive(Debug, thiserror::Error)]
pub enum PostcodeError {
    /// The configured file does not exist.
    #[error("Postcode file not found: {}", path.display())]
    NotFound {
        /// Configured path.
        path: PathBuf,
    },

    /// The file could not be read as a `GeoPackage`.
    #[error("GeoPackage read error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A geometry blob could not be decoded.
    #[error("Geometry decode error: {message}")]
    Geometry {
        /// Decoder message.
        message: String,
    },

    /// The layer's spatial reference system has no transform to WGS84.
    #[error("Unsupported spatial reference system: {srs_id}")]
    UnsupportedCrs {
        /// Declared SRS id.
        srs_id: i64,
    },

    /// The named layer has no entry in `gpkg_geometry_columns`.
    #[error("Layer '{layer}' not found")]
    MissingLayer {
        /// Requested layer name.
        layer: String,
    },

    /// The blocking load task panicked or was cancelled.
    #[error("Postcode load task failed: {message}")]
    Task {
        /// Join error message.
        message: String,
    },
}

/// One postcode boundary with its allow-listed attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct PostcodeRecord {
    /// Attribute values keyed by their layer column name.
    pub properties: JsonObject,
    /// Boundary in WGS84. `None` when the stored geometry was null or
    /// undecodable.
    pub geometry: Option<geojson::Geometry>,
}

/// Reads a numeric attribute the way the frontend expects: numbers as-is,
/// numeric strings parsed, anything else zero.
#[must_use]
pub fn numeric(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

impl PostcodeRecord {
    /// The stored postcode as text, if the layer has one for this record.
    #[must_use]
    pub fn postcode(&self) -> Option<String> {
        match self.properties.get("Postcode")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// An attribute value, or JSON null when absent.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Value {
        self.properties.get(name).cloned().unwrap_or(Value::Null)
    }

    /// An attribute value, or `0` when the column is absent.
    #[must_use]
    pub fn attribute_or_zero(&self, name: &str) -> Value {
        self.properties
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::from(0))
    }

    /// `affected_count` coerced to a number.
    #[must_use]
    pub fn affected_count(&self) -> f64 {
        numeric(self.properties.get("affected_count"))
    }

    /// The record as a `GeoJSON` feature.
    #[must_use]
    pub fn to_feature(&self) -> Feature {
        Feature {
            bbox: None,
            geometry: self.geometry.clone(),
            id: None,
            properties: Some(self.properties.clone()),
            foreign_members: None,
        }
    }
}

/// Listing filter on `affected_count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AffectedFilter {
    /// Every record.
    #[default]
    All,
    /// `affected_count > 0`.
    Affected,
    /// `affected_count == 0`.
    Unaffected,
}

impl AffectedFilter {
    /// Parses the `filter` query parameter. Unrecognized values list
    /// everything.
    #[must_use]
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("affected") => Self::Affected,
            Some("unaffected") => Self::Unaffected,
            _ => Self::All,
        }
    }

    /// Whether `record` passes the filter.
    #[must_use]
    pub fn matches(self, record: &PostcodeRecord) -> bool {
        match self {
            Self::All => true,
            Self::Affected => record.affected_count() > 0.0,
            #[allow(clippy::float_cmp)]
            Self::Unaffected => record.affected_count() == 0.0,
        }
    }
}

/// Collects the records passing `filter`, in load order. Records without
/// a boundary stay searchable but are left out of the listing.
#[must_use]
pub fn list(records: &[PostcodeRecord], filter: AffectedFilter) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: records
            .iter()
            .filter(|r| r.geometry.is_some() && filter.matches(r))
            .map(PostcodeRecord::to_feature)
            .collect(),
        foreign_members: None,
    }
}

/// Uppercases and trims a search term.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    query.trim().to_uppercase()
}

fn strip_spaces(s: &str) -> String {
    s.chars().filter(|c| *c != ' ').collect()
}

/// Finds the record for a postcode.
///
/// Exact and space-insensitive matches are tried across every record
/// first; only if none match is the first record whose stripped postcode
/// starts with the stripped query returned. Ties go to load order.
#[must_use]
pub fn find<'a>(records: &'a [PostcodeRecord], query: &str) -> Option<&'a PostcodeRecord> {
    let exact = normalize_query(query);
    let compact = strip_spaces(&exact);
    if compact.is_empty() {
        return None;
    }

    let keyed: Vec<(&PostcodeRecord, String)> = records
        .iter()
        .filter_map(|r| r.postcode().map(|pc| (r, pc.to_uppercase())))
        .collect();

    keyed
        .iter()
        .find(|(_, pc)| *pc == exact || strip_spaces(pc) == compact)
        .or_else(|| {
            keyed
                .iter()
                .find(|(_, pc)| strip_spaces(pc).starts_with(&compact))
        })
        .map(|(r, _)| *r)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn record(postcode: &str, affected: Value) -> PostcodeRecord {
        let mut properties = JsonObject::new();
        properties.insert("Postcode".to_string(), Value::from(postcode));
        properties.insert("District".to_string(), Value::from("EH11"));
        properties.insert("affected_count".to_string(), affected);
        PostcodeRecord {
            properties,
            geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
                -3.2, 55.93,
            ]))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;

    fn sample() -> Vec<PostcodeRecord> {
        vec![
            record("EH11 2NA", Value::from(3)),
            record("EH11 2NB", Value::from(0)),
            record("EH14 1AA", Value::from("5")),
            record("EH14 1AB", Value::Null),
        ]
    }

    #[test]
    fn search_matches_exact_and_space_insensitive() {
        let records = sample();
        assert_eq!(
            find(&records, "EH11 2NA").and_then(PostcodeRecord::postcode),
            Some("EH11 2NA".to_string())
        );
        assert_eq!(
            find(&records, "eh112na").and_then(PostcodeRecord::postcode),
            Some("EH11 2NA".to_string())
        );
        assert_eq!(
            find(&records, "  eh11 2nb ").and_then(PostcodeRecord::postcode),
            Some("EH11 2NB".to_string())
        );
    }

    #[test]
    fn search_falls_back_to_prefix() {
        let records = sample();
        assert_eq!(
            find(&records, "EH14").and_then(PostcodeRecord::postcode),
            Some("EH14 1AA".to_string())
        );
    }

    #[test]
    fn exact_match_beats_earlier_prefix_match() {
        let records = vec![
            record("EH1 1AAX", Value::from(0)),
            record("EH1 1AA", Value::from(0)),
        ];
        assert_eq!(
            find(&records, "EH1 1AA").and_then(PostcodeRecord::postcode),
            Some("EH1 1AA".to_string())
        );
    }

    #[test]
    fn search_miss_and_blank() {
        let records = sample();
        assert!(find(&records, "G1 1AA").is_none());
        assert!(find(&records, "   ").is_none());
    }

    #[test]
    fn affected_filter_coerces_counts() {
        let records = sample();
        let affected = list(&records, AffectedFilter::Affected);
        assert_eq!(affected.features.len(), 2);

        let unaffected = list(&records, AffectedFilter::Unaffected);
        assert_eq!(unaffected.features.len(), 2);
    }

    #[test]
    fn unknown_filter_lists_everything() {
        assert_eq!(AffectedFilter::from_param(Some("banana")), AffectedFilter::All);
        assert_eq!(AffectedFilter::from_param(None), AffectedFilter::All);
        assert_eq!(
            AffectedFilter::from_param(Some(" Affected ")),
            AffectedFilter::Affected
        );
        assert_eq!(list(&sample(), AffectedFilter::All).features.len(), 4);
    }

    #[test]
    fn listing_skips_records_without_boundary() {
        let mut records = sample();
        records[0].geometry = None;

        let listed = list(&records, AffectedFilter::All);
        assert_eq!(listed.features.len(), 3);
        assert!(listed.features.iter().all(|f| f.geometry.is_some()));

        assert_eq!(
            find(&records, "EH11 2NA").and_then(PostcodeRecord::postcode),
            Some("EH11 2NA".to_string())
        );
    }

    #[test]
    fn missing_attributes_default() {
        let r = record("EH11 2NA", Value::from(1));
        assert_eq!(r.attribute("Sector"), Value::Null);
        assert_eq!(r.attribute_or_zero("total_damage"), Value::from(0));
        assert_eq!(r.attribute("District"), Value::from("EH11"));
    }
}
