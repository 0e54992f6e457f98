//! `GeoPackage` layer reader.
//!
//! A `GeoPackage` is an `SQLite` file: the layer is an ordinary table whose
//! geometry column holds `GPKG`-framed WKB. The column name and SRS come
//! from `gpkg_geometry_columns`.

use std::path::Path;

use geo::MapCoords as _;
use geojson::JsonObject;
use geozero::ToGeo as _;
use geozero::wkb::GpkgWkb;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension as _, params};
use serde_json::Value;

use crate::{ATTRIBUTE_ALLOW_LIST, PostcodeError, PostcodeRecord, osgb};

/// Assumed when the layer declares no reference system.
pub const DEFAULT_SRS_ID: i64 = 27700;

/// EPSG code of WGS84 geographic coordinates.
pub const WGS84_SRS_ID: i64 = 4326;

/// Coordinate conversion into WGS84.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordTransform {
    /// Already WGS84.
    Identity,
    /// British National Grid easting/northing.
    NationalGrid,
}

impl CoordTransform {
    /// Picks the transform for an EPSG code. Non-positive codes are the
    /// `GeoPackage` "undefined" markers and fall back to
    /// [`DEFAULT_SRS_ID`].
    ///
    /// # Errors
    ///
    /// Returns [`PostcodeError::UnsupportedCrs`] for any other system.
    pub fn for_srs(srs_id: i64) -> Result<Self, PostcodeError> {
        let srs_id = if srs_id <= 0 { DEFAULT_SRS_ID } else { srs_id };
        match srs_id {
            WGS84_SRS_ID => Ok(Self::Identity),
            DEFAULT_SRS_ID => Ok(Self::NationalGrid),
            other => Err(PostcodeError::UnsupportedCrs { srs_id: other }),
        }
    }

    /// Reprojects every coordinate of `geometry`.
    #[must_use]
    pub fn apply(self, geometry: geo::Geometry<f64>) -> geo::Geometry<f64> {
        match self {
            Self::Identity => geometry,
            Self::NationalGrid => geometry.map_coords(|c| {
                let (x, y) = osgb::grid_to_wgs84(c.x, c.y);
                geo::Coord { x, y }
            }),
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Geometry column name and declared SRS id of `layer`.
fn geometry_column(conn: &Connection, layer: &str) -> Result<(String, i64), PostcodeError> {
    conn.query_row(
        "SELECT column_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?1",
        params![layer],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<i64>>(1)?.unwrap_or(0),
            ))
        },
    )
    .optional()?
    .ok_or_else(|| PostcodeError::MissingLayer {
        layer: layer.to_string(),
    })
}

/// Maps a `GeoPackage` srs id to an EPSG code. Most files use the EPSG
/// code as the srs id, but the definition table is authoritative.
fn resolve_epsg(conn: &Connection, srs_id: i64) -> Result<i64, PostcodeError> {
    if srs_id <= 0 {
        return Ok(srs_id);
    }

    let definition = conn
        .query_row(
            "SELECT organization, organization_coordsys_id
             FROM gpkg_spatial_ref_sys
             WHERE srs_id = ?1",
            params![srs_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;

    Ok(match definition {
        Some((org, code)) if org.eq_ignore_ascii_case("EPSG") => code,
        _ => srs_id,
    })
}

fn table_columns(conn: &Connection, layer: &str) -> Result<Vec<String>, PostcodeError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(layer)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn attribute_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::from(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Decodes one `GPKG` geometry blob and reprojects it.
///
/// # Errors
///
/// Returns [`PostcodeError::Geometry`] if the blob is not valid `GPKG` WKB.
pub fn decode_geometry(
    blob: &[u8],
    transform: CoordTransform,
) -> Result<geojson::Geometry, PostcodeError> {
    let geometry = GpkgWkb(blob.to_vec())
        .to_geo()
        .map_err(|e| PostcodeError::Geometry {
            message: e.to_string(),
        })?;

    let geometry = transform.apply(geometry);
    Ok(geojson::Geometry::new(geojson::Value::from(&geometry)))
}

/// Reads every feature of `layer` from the `GeoPackage` at `path`.
///
/// Records keep load order. A geometry that fails to decode is logged and
/// left as `None`; the record is still returned.
///
/// # Errors
///
/// * [`PostcodeError::NotFound`] if `path` does not exist
/// * [`PostcodeError::MissingLayer`] if `layer` is not a feature table
/// * [`PostcodeError::UnsupportedCrs`] if the layer SRS cannot be converted
/// * [`PostcodeError::Sqlite`] for any other read failure
pub fn read_layer(path: &Path, layer: &str) -> Result<Vec<PostcodeRecord>, PostcodeError> {
    if !path.exists() {
        return Err(PostcodeError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let (geom_column, srs_id) = geometry_column(&conn, layer)?;
    let epsg = resolve_epsg(&conn, srs_id)?;
    let transform = CoordTransform::for_srs(epsg)?;
    log::debug!("Postcode layer '{layer}': geometry column '{geom_column}', EPSG:{epsg}");

    let present = table_columns(&conn, layer)?;
    let kept: Vec<&str> = ATTRIBUTE_ALLOW_LIST
        .iter()
        .copied()
        .filter(|name| present.iter().any(|p| p == name))
        .collect();

    let mut select = vec![quote_ident(&geom_column)];
    select.extend(kept.iter().map(|name| quote_ident(name)));
    let sql = format!("SELECT {} FROM {}", select.join(", "), quote_ident(layer));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;

    let mut records = Vec::new();
    let mut undecodable = 0usize;

    while let Some(row) = rows.next()? {
        let geometry = match row.get_ref(0)? {
            ValueRef::Blob(blob) => match decode_geometry(blob, transform) {
                Ok(geometry) => Some(geometry),
                Err(e) => {
                    undecodable += 1;
                    log::warn!("Postcode row {}: {e}", records.len());
                    None
                }
            },
            _ => None,
        };

        let mut properties = JsonObject::new();
        for (idx, name) in kept.iter().enumerate() {
            properties.insert((*name).to_string(), attribute_value(row.get_ref(idx + 1)?));
        }

        records.push(PostcodeRecord {
            properties,
            geometry,
        });
    }

    if undecodable > 0 {
        log::warn!("{undecodable} postcode geometries could not be decoded");
    }

    Ok(records)
}
