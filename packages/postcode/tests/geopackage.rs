use std::path::{Path, PathBuf};

use leith_map_postcode::gpkg::read_layer;
use leith_map_postcode::{AffectedFilter, PostcodeCache, PostcodeError};
use rusqlite::{Connection, params};

/// GPKG header (little-endian, no envelope) followed by a WKB polygon.
fn gpkg_polygon(srs_id: i32, ring: &[(f64, f64)]) -> Vec<u8> {
    let mut blob = Vec::new();
    blob.extend_from_slice(b"GP");
    blob.push(0);
    blob.push(0b0000_0001);
    blob.extend_from_slice(&srs_id.to_le_bytes());

    blob.push(1);
    blob.extend_from_slice(&3u32.to_le_bytes());
    blob.extend_from_slice(&1u32.to_le_bytes());
    blob.extend_from_slice(&u32::try_from(ring.len()).unwrap().to_le_bytes());
    for (x, y) in ring {
        blob.extend_from_slice(&x.to_le_bytes());
        blob.extend_from_slice(&y.to_le_bytes());
    }
    blob
}

fn square(x: f64, y: f64, size: f64) -> Vec<(f64, f64)> {
    vec![
        (x, y),
        (x + size, y),
        (x + size, y + size),
        (x, y + size),
        (x, y),
    ]
}

fn write_fixture(path: &Path, srs_id: i32) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        r"
        CREATE TABLE gpkg_spatial_ref_sys (
          srs_name TEXT NOT NULL,
          srs_id INTEGER PRIMARY KEY,
          organization TEXT NOT NULL,
          organization_coordsys_id INTEGER NOT NULL,
          definition TEXT NOT NULL,
          description TEXT
        );

        CREATE TABLE gpkg_geometry_columns (
          table_name TEXT NOT NULL,
          column_name TEXT NOT NULL,
          geometry_type_name TEXT NOT NULL,
          srs_id INTEGER NOT NULL,
          z TINYINT NOT NULL,
          m TINYINT NOT NULL
        );

        CREATE TABLE postcode (
          fid INTEGER PRIMARY KEY AUTOINCREMENT,
          geom POLYGON,
          Postcode TEXT,
          District TEXT,
          affected_count INTEGER,
          total_damage REAL,
          extra TEXT
        );
        ",
    )
    .unwrap();

    conn.execute(
        "INSERT INTO gpkg_spatial_ref_sys VALUES ('fixture', ?1, 'EPSG', ?1, 'undefined', NULL)",
        params![srs_id],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO gpkg_geometry_columns VALUES ('postcode', 'geom', 'POLYGON', ?1, 0, 0)",
        params![srs_id],
    )
    .unwrap();

    let (origin, size) = if srs_id == 4326 {
        ((-3.25, 55.92), 0.01)
    } else {
        ((325_900.0, 673_900.0), 100.0)
    };

    let rows: [(&str, i64, f64, Option<Vec<u8>>); 3] = [
        (
            "EH11 2NA",
            4,
            125_000.5,
            Some(gpkg_polygon(srs_id, &square(origin.0, origin.1, size))),
        ),
        (
            "EH11 2NB",
            0,
            0.0,
            Some(gpkg_polygon(
                srs_id,
                &square(origin.0 + size, origin.1, size),
            )),
        ),
        ("EH14 1AA", 1, 900.0, None),
    ];

    for (postcode, affected, damage, geom) in rows {
        conn.execute(
            "INSERT INTO postcode (geom, Postcode, District, affected_count, total_damage, extra)
             VALUES (?1, ?2, 'EH11', ?3, ?4, 'ignored')",
            params![geom, postcode, affected, damage],
        )
        .unwrap();
    }
}

fn fixture(srs_id: i32) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Postcode.gpkg");
    write_fixture(&path, srs_id);
    (dir, path)
}

fn first_position(geometry: &geojson::Geometry) -> (f64, f64) {
    match &geometry.value {
        geojson::Value::Polygon(rings) => (rings[0][0][0], rings[0][0][1]),
        other => panic!("expected polygon, got {other:?}"),
    }
}

#[test]
fn national_grid_layer_is_reprojected_to_wgs84() {
    let (_dir, path) = fixture(27700);
    let records = read_layer(&path, "postcode").unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].postcode().as_deref(), Some("EH11 2NA"));

    let (lon, lat) = first_position(records[0].geometry.as_ref().unwrap());
    assert!((lon + 3.189).abs() < 0.01, "lon {lon}");
    assert!((lat - 55.952).abs() < 0.01, "lat {lat}");
}

#[test]
fn wgs84_layer_keeps_coordinates() {
    let (_dir, path) = fixture(4326);
    let records = read_layer(&path, "postcode").unwrap();

    let (lon, lat) = first_position(records[0].geometry.as_ref().unwrap());
    assert!((lon + 3.25).abs() < 1e-12);
    assert!((lat - 55.92).abs() < 1e-12);
}

#[test]
fn only_allow_listed_columns_are_kept() {
    let (_dir, path) = fixture(4326);
    let records = read_layer(&path, "postcode").unwrap();

    let mut keys: Vec<&str> = records[0].properties.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec!["District", "Postcode", "affected_count", "total_damage"]
    );
    assert_eq!(records[0].attribute("Sector"), serde_json::Value::Null);
}

#[test]
fn null_geometry_is_searchable_but_not_listed() {
    let (_dir, path) = fixture(4326);
    let records = read_layer(&path, "postcode").unwrap();

    assert_eq!(records[2].postcode().as_deref(), Some("EH14 1AA"));
    assert!(records[2].geometry.is_none());

    let listed = leith_map_postcode::list(&records, AffectedFilter::All);
    assert_eq!(listed.features.len(), 2);
    assert!(listed.features.iter().all(|f| f.geometry.is_some()));
}

#[test]
fn unknown_layer_is_reported() {
    let (_dir, path) = fixture(4326);
    assert!(matches!(
        read_layer(&path, "districts"),
        Err(PostcodeError::MissingLayer { .. })
    ));
}

#[test]
fn unsupported_reference_system_fails_the_load() {
    let (_dir, path) = fixture(3857);
    assert!(matches!(
        read_layer(&path, "postcode"),
        Err(PostcodeError::UnsupportedCrs { srs_id: 3857 })
    ));
}

#[tokio::test]
async fn cache_serves_filtered_views_of_the_file() {
    let (_dir, path) = fixture(27700);
    let cache = PostcodeCache::from_geopackage(&path, "postcode");

    let affected = cache.list(AffectedFilter::Affected).await.unwrap();
    assert_eq!(affected.features.len(), 1);

    let unaffected = cache.list(AffectedFilter::Unaffected).await.unwrap();
    assert_eq!(unaffected.features.len(), 1);

    let all = serde_json::to_value(cache.list(AffectedFilter::All).await.unwrap()).unwrap();
    let features = all["features"].as_array().unwrap();
    assert_eq!(features.len(), 2);
    assert!(features.iter().all(|f| f["geometry"].is_object()));

    let hit = cache.search("eh14").await.unwrap().unwrap();
    assert_eq!(hit.postcode().as_deref(), Some("EH14 1AA"));
}
