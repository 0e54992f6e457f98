//! Coerces stored geometry column values into canonical `GeoJSON`
//! geometries.
//!
//! Three stored shapes are accepted: a bare coordinate array (the exterior
//! ring of a single polygon), a `GeoJSON` geometry object, and a `GeoJSON`
//! `Feature` wrapping a geometry. Anything else is rejected so that a
//! malformed geometry never reaches a response.

use geojson::Geometry;
use leith_map_flood_models::StoredGeometry;
use serde_json::{Map, Value};

/// Number of characters of the offending text kept for diagnostics.
const SAMPLE_CHARS: usize = 120;

/// Why a stored geometry could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// The column value could not be read at all.
    #[error("unreadable geometry column: {message}")]
    Unreadable {
        /// Conversion error reported by the store.
        message: String,
    },

    /// The column text is not valid JSON.
    #[error("malformed geometry JSON: {message} (sample: {sample})")]
    MalformedJson {
        /// Parser error message.
        message: String,
        /// Leading characters of the offending text.
        sample: String,
    },

    /// The JSON parsed but matches none of the accepted shapes.
    #[error("unknown geometry shape: {found}")]
    UnknownShape {
        /// Short description of what was found instead.
        found: String,
    },

    /// A `Feature` wrapper whose `geometry` member is null or missing.
    #[error("feature has no geometry")]
    MissingGeometry,

    /// The shape was recognised but its contents are not a valid geometry.
    #[error("invalid geometry: {message}")]
    InvalidGeometry {
        /// `GeoJSON` validation message.
        message: String,
    },
}

/// Structural classification of a parsed geometry column.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredShape {
    /// A bare coordinate array, read as one polygon exterior ring.
    RawRing(Vec<Value>),
    /// An object with both `type` and `coordinates`.
    GeometryObject(Map<String, Value>),
    /// A `Feature` object; carries its `geometry` member, if any.
    FeatureWrapper(Option<Value>),
    /// Anything else.
    Invalid(String),
}

impl StoredShape {
    /// Classifies a parsed JSON value by inspecting its structure.
    #[must_use]
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Array(ring) => Self::RawRing(ring),
            Value::Object(obj) if obj.contains_key("type") && obj.contains_key("coordinates") => {
                Self::GeometryObject(obj)
            }
            Value::Object(mut obj)
                if obj.get("type").and_then(Value::as_str) == Some("Feature") =>
            {
                Self::FeatureWrapper(obj.remove("geometry"))
            }
            Value::Object(obj) => {
                let keys: Vec<&str> = obj.keys().take(10).map(String::as_str).collect();
                Self::Invalid(format!("object with keys [{}]", keys.join(", ")))
            }
            Value::Null => Self::Invalid("null".to_string()),
            Value::Bool(_) => Self::Invalid("boolean".to_string()),
            Value::Number(_) => Self::Invalid("number".to_string()),
            Value::String(_) => Self::Invalid("string".to_string()),
        }
    }

    /// Resolves this shape into a canonical geometry.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError`] for [`StoredShape::Invalid`], for a
    /// `Feature` with no geometry, or when the resulting object is not a
    /// valid `GeoJSON` geometry.
    pub fn into_geometry(self) -> Result<Geometry, NormalizeError> {
        let value = match self {
            Self::RawRing(ring) => serde_json::json!({
                "type": "Polygon",
                "coordinates": [ring],
            }),
            Self::GeometryObject(obj) => Value::Object(obj),
            Self::FeatureWrapper(Some(geometry)) if !geometry.is_null() => geometry,
            Self::FeatureWrapper(_) => return Err(NormalizeError::MissingGeometry),
            Self::Invalid(found) => return Err(NormalizeError::UnknownShape { found }),
        };

        Geometry::from_json_value(value).map_err(|e| NormalizeError::InvalidGeometry {
            message: e.to_string(),
        })
    }
}

/// Decodes a stored value into trimmed text. Invalid UTF-8 sequences are
/// replaced rather than rejected.
///
/// # Errors
///
/// Returns [`NormalizeError::Unreadable`] for a value the store could not
/// convert.
pub fn decode_text(stored: &StoredGeometry) -> Result<String, NormalizeError> {
    match stored {
        StoredGeometry::Text(text) => Ok(text.trim().to_string()),
        StoredGeometry::Bytes(bytes) => Ok(String::from_utf8_lossy(bytes).trim().to_string()),
        StoredGeometry::Unreadable(message) => Err(NormalizeError::Unreadable {
            message: message.clone(),
        }),
    }
}

/// Normalizes a stored geometry column value into a `GeoJSON` geometry.
///
/// # Errors
///
/// Returns [`NormalizeError::Unreadable`] for an unconverted column,
/// [`NormalizeError::MalformedJson`] if the text does not parse, and the
/// shape errors described on [`StoredShape::into_geometry`] otherwise.
pub fn normalize(stored: &StoredGeometry) -> Result<Geometry, NormalizeError> {
    let text = decode_text(stored)?;

    let value: Value = serde_json::from_str(&text).map_err(|e| NormalizeError::MalformedJson {
        message: e.to_string(),
        sample: text.chars().take(SAMPLE_CHARS).collect(),
    })?;

    StoredShape::classify(value).into_geometry()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::Value as GeoValue;

    fn text(s: &str) -> StoredGeometry {
        StoredGeometry::Text(s.to_string())
    }

    #[test]
    fn raw_ring_becomes_single_ring_polygon() {
        let geometry = normalize(&text("[[0,0],[1,0],[1,1],[0,0]]")).unwrap();
        let GeoValue::Polygon(rings) = geometry.value else {
            panic!("expected polygon, got {:?}", geometry.value);
        };
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].len(), 4);
        assert_eq!(rings[0][1], vec![1.0, 0.0]);
    }

    #[test]
    fn geometry_object_passes_through() {
        let raw = r#"{"type":"Point","coordinates":[-3.2,55.9]}"#;
        let geometry = normalize(&text(raw)).unwrap();
        assert_eq!(geometry.value, GeoValue::Point(vec![-3.2, 55.9]));
    }

    #[test]
    fn feature_wrapper_yields_inner_geometry() {
        let inner = r#"{"type":"LineString","coordinates":[[0,0],[2,2]]}"#;
        let raw = format!(r#"{{"type":"Feature","properties":{{}},"geometry":{inner}}}"#);
        let geometry = normalize(&text(&raw)).unwrap();
        let expected = normalize(&text(inner)).unwrap();
        assert_eq!(geometry, expected);
    }

    #[test]
    fn feature_with_null_geometry_is_failure() {
        let err = normalize(&text(r#"{"type":"Feature","geometry":null}"#)).unwrap_err();
        assert_eq!(err, NormalizeError::MissingGeometry);

        let err = normalize(&text(r#"{"type":"Feature","properties":{}}"#)).unwrap_err();
        assert_eq!(err, NormalizeError::MissingGeometry);
    }

    #[test]
    fn malformed_json_is_reported_with_sample() {
        let err = normalize(&text("{\"type\": \"Polygon\", ")).unwrap_err();
        match err {
            NormalizeError::MalformedJson { sample, .. } => {
                assert!(sample.starts_with("{\"type\""));
            }
            other => panic!("expected malformed json, got {other:?}"),
        }
    }

    #[test]
    fn sample_is_bounded() {
        let long = format!("{{{}", "x".repeat(500));
        let Err(NormalizeError::MalformedJson { sample, .. }) = normalize(&text(&long)) else {
            panic!("expected malformed json");
        };
        assert_eq!(sample.chars().count(), SAMPLE_CHARS);
    }

    #[test]
    fn unknown_shapes_are_rejected() {
        for raw in ["42", "null", "\"polygon\"", "true", r#"{"type":"Polygon"}"#] {
            let err = normalize(&text(raw)).unwrap_err();
            assert!(
                matches!(err, NormalizeError::UnknownShape { .. }),
                "{raw} gave {err:?}"
            );
        }
    }

    #[test]
    fn invalid_coordinates_are_rejected() {
        let err = normalize(&text(r#"{"type":"Polygon","coordinates":"nope"}"#)).unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidGeometry { .. }));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let geometry = normalize(&text("  \n[[0,0],[1,1],[0,1],[0,0]]\t ")).unwrap();
        assert!(matches!(geometry.value, GeoValue::Polygon(_)));
    }

    #[test]
    fn invalid_utf8_bytes_are_replaced_not_fatal() {
        let mut bytes = br#"{"type":"Point","coordinates":[1,2]}"#.to_vec();
        bytes.push(0xFF);
        // The replacement character makes the JSON malformed, but decoding
        // itself must not fail.
        assert!(
            decode_text(&StoredGeometry::Bytes(bytes.clone()))
                .unwrap()
                .ends_with('\u{FFFD}')
        );
        assert!(matches!(
            normalize(&StoredGeometry::Bytes(bytes)),
            Err(NormalizeError::MalformedJson { .. })
        ));

        let clean = br#" {"type":"Point","coordinates":[1,2]} "#.to_vec();
        let geometry = normalize(&StoredGeometry::Bytes(clean)).unwrap();
        assert_eq!(geometry.value, GeoValue::Point(vec![1.0, 2.0]));
    }

    #[test]
    fn unreadable_column_reports_conversion_error() {
        let stored = StoredGeometry::Unreadable("geom_json: expected text".to_string());
        let err = normalize(&stored).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unreadable geometry column: geom_json: expected text"
        );
    }
}
