//! British National Grid (EPSG:27700) to WGS84 (EPSG:4326).
//!
//! Two steps:
//! - inverse Transverse Mercator on the Airy 1830 ellipsoid, giving OSGB36
//!   latitude/longitude
//! - a seven-parameter Helmert shift from OSGB36 to WGS84
//!
//! The Helmert step is accurate to a few metres, which is well below the
//! resolution of postcode boundary polygons.

use std::f64::consts::PI;

const TO_RAD: f64 = PI / 180.0;
const TO_DEG: f64 = 180.0 / PI;
const ARC_SECOND: f64 = PI / (180.0 * 3600.0);

/// Reference ellipsoid axes in metres.
#[derive(Debug, Clone, Copy)]
struct Ellipsoid {
    a: f64,
    b: f64,
}

impl Ellipsoid {
    const fn e2(&self) -> f64 {
        (self.a * self.a - self.b * self.b) / (self.a * self.a)
    }
}

const AIRY_1830: Ellipsoid = Ellipsoid {
    a: 6_377_563.396,
    b: 6_356_256.909,
};

const WGS84: Ellipsoid = Ellipsoid {
    a: 6_378_137.0,
    b: 6_356_752.314_245,
};

/// National Grid true origin and scale.
const F0: f64 = 0.999_601_271_7;
const LAT0_DEG: f64 = 49.0;
const LON0_DEG: f64 = -2.0;
const E0: f64 = 400_000.0;
const N0: f64 = -100_000.0;

/// OSGB36 to WGS84 Helmert parameters.
const TX: f64 = 446.448;
const TY: f64 = -125.157;
const TZ: f64 = 542.060;
const SCALE_PPM: f64 = -20.4894;
const RX_SEC: f64 = 0.1502;
const RY_SEC: f64 = 0.2470;
const RZ_SEC: f64 = 0.8421;

/// Meridional arc from the true origin latitude to `lat` (radians).
fn meridional_arc(lat: f64) -> f64 {
    let Ellipsoid { a, b } = AIRY_1830;
    let n = (a - b) / (a + b);
    let (n2, n3) = (n * n, n * n * n);
    let lat0 = LAT0_DEG * TO_RAD;
    let dlat = lat - lat0;
    let slat = lat + lat0;

    let ma = (1.0 + n + 1.25 * n2 + 1.25 * n3) * dlat;
    let mb = 2.625f64.mul_add(n3, 3.0f64.mul_add(n, 3.0 * n2)) * dlat.sin() * slat.cos();
    let mc = 1.875 * (n2 + n3) * (2.0 * dlat).sin() * (2.0 * slat).cos();
    let md = (35.0 / 24.0) * n3 * (3.0 * dlat).sin() * (3.0 * slat).cos();

    b * F0 * (ma - mb + mc - md)
}

/// Converts National Grid easting/northing to OSGB36 latitude/longitude in
/// degrees.
#[must_use]
pub fn grid_to_osgb36(easting: f64, northing: f64) -> (f64, f64) {
    let Ellipsoid { a, .. } = AIRY_1830;
    let e2 = AIRY_1830.e2();
    let lat0 = LAT0_DEG * TO_RAD;
    let lon0 = LON0_DEG * TO_RAD;

    let mut lat = lat0;
    let mut m = 0.0;
    for _ in 0..64 {
        lat += (northing - N0 - m) / (a * F0);
        m = meridional_arc(lat);
        let residual = (northing - N0 - m).abs();
        if residual < 0.000_01 || residual.is_nan() {
            break;
        }
    }

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();
    let sec_lat = 1.0 / cos_lat;
    let t2 = tan_lat * tan_lat;
    let t4 = t2 * t2;
    let t6 = t4 * t2;

    let denom = e2.mul_add(-(sin_lat * sin_lat), 1.0);
    let nu = a * F0 / denom.sqrt();
    let rho = a * F0 * (1.0 - e2) / denom.powf(1.5);
    let eta2 = nu / rho - 1.0;

    let nu3 = nu.powi(3);
    let nu5 = nu.powi(5);
    let nu7 = nu.powi(7);

    let vii = tan_lat / (2.0 * rho * nu);
    let viii = tan_lat / (24.0 * rho * nu3) * (5.0 + 3.0 * t2 + eta2 - 9.0 * t2 * eta2);
    let ix = tan_lat / (720.0 * rho * nu5) * (61.0 + 90.0 * t2 + 45.0 * t4);
    let x = sec_lat / nu;
    let xi = sec_lat / (6.0 * nu3) * (nu / rho + 2.0 * t2);
    let xii = sec_lat / (120.0 * nu5) * (5.0 + 28.0 * t2 + 24.0 * t4);
    let xiia = sec_lat / (5040.0 * nu7) * (61.0 + 662.0 * t2 + 1320.0 * t4 + 720.0 * t6);

    let de = easting - E0;
    let de2 = de * de;
    let de3 = de2 * de;
    let de4 = de3 * de;
    let de5 = de4 * de;
    let de6 = de5 * de;
    let de7 = de6 * de;

    let lat = lat - vii * de2 + viii * de4 - ix * de6;
    let lon = lon0 + x * de - xi * de3 + xii * de5 - xiia * de7;

    (lat * TO_DEG, lon * TO_DEG)
}

fn to_cartesian(ellipsoid: Ellipsoid, lat: f64, lon: f64) -> (f64, f64, f64) {
    let e2 = ellipsoid.e2();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let nu = ellipsoid.a / e2.mul_add(-(sin_lat * sin_lat), 1.0).sqrt();

    (
        nu * cos_lat * lon.cos(),
        nu * cos_lat * lon.sin(),
        nu * (1.0 - e2) * sin_lat,
    )
}

fn from_cartesian(ellipsoid: Ellipsoid, x: f64, y: f64, z: f64) -> (f64, f64) {
    let e2 = ellipsoid.e2();
    let p = x.hypot(y);

    let mut lat = z.atan2(p * (1.0 - e2));
    for _ in 0..10 {
        let sin_lat = lat.sin();
        let nu = ellipsoid.a / e2.mul_add(-(sin_lat * sin_lat), 1.0).sqrt();
        let next = (e2 * nu).mul_add(sin_lat, z).atan2(p);
        if (next - lat).abs() < 1e-12 {
            lat = next;
            break;
        }
        lat = next;
    }

    (lat, y.atan2(x))
}

/// Shifts OSGB36 latitude/longitude (degrees) onto WGS84.
#[must_use]
pub fn osgb36_to_wgs84(lat_deg: f64, lon_deg: f64) -> (f64, f64) {
    let (x, y, z) = to_cartesian(AIRY_1830, lat_deg * TO_RAD, lon_deg * TO_RAD);

    let s1 = SCALE_PPM / 1e6 + 1.0;
    let rx = RX_SEC * ARC_SECOND;
    let ry = RY_SEC * ARC_SECOND;
    let rz = RZ_SEC * ARC_SECOND;

    let x2 = TX + x * s1 - y * rz + z * ry;
    let y2 = TY + x * rz + y * s1 - z * rx;
    let z2 = TZ - x * ry + y * rx + z * s1;

    let (lat, lon) = from_cartesian(WGS84, x2, y2, z2);
    (lat * TO_DEG, lon * TO_DEG)
}

/// Converts National Grid easting/northing to WGS84 `(lon, lat)` degrees,
/// the axis order used by `GeoJSON`.
#[must_use]
pub fn grid_to_wgs84(easting: f64, northing: f64) -> (f64, f64) {
    let (lat, lon) = grid_to_osgb36(easting, northing);
    let (lat, lon) = osgb36_to_wgs84(lat, lon);
    (lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_projection_matches_ordnance_survey_worked_example() {
        // Ordnance Survey "A guide to coordinate systems in Great Britain",
        // worked example C.2.
        let (lat, lon) = grid_to_osgb36(651_409.903, 313_177.270);
        assert!((lat - 52.657_570_3).abs() < 1e-6, "lat {lat}");
        assert!((lon - 1.717_921_6).abs() < 1e-6, "lon {lon}");
    }

    #[test]
    fn true_origin_maps_to_origin_latitude_and_meridian() {
        let (lat, lon) = grid_to_osgb36(E0, 0.0);
        assert!((lon - LON0_DEG).abs() < 1e-9);
        assert!(lat > LAT0_DEG && lat < 50.0);
    }

    #[test]
    fn helmert_shift_is_small() {
        let (lat, lon) = osgb36_to_wgs84(55.95, -3.19);
        // OSGB36 and WGS84 differ by roughly 100 m in Scotland.
        assert!((lat - 55.95).abs() < 0.003, "lat {lat}");
        assert!((lon + 3.19).abs() < 0.003, "lon {lon}");
        assert!((lat - 55.95).abs() > 1e-6 || (lon + 3.19).abs() > 1e-6);
    }

    #[test]
    fn edinburgh_grid_reference_lands_in_edinburgh() {
        // Waverley station, approximately.
        let (lon, lat) = grid_to_wgs84(325_900.0, 673_900.0);
        assert!((lat - 55.952).abs() < 0.01, "lat {lat}");
        assert!((lon + 3.189).abs() < 0.01, "lon {lon}");
    }

    #[test]
    fn cartesian_round_trip_is_stable() {
        let (lat, lon) = (55.9_f64.to_radians(), (-3.2_f64).to_radians());
        let (x, y, z) = to_cartesian(WGS84, lat, lon);
        let (lat2, lon2) = from_cartesian(WGS84, x, y, z);
        assert!((lat - lat2).abs() < 1e-10);
        assert!((lon - lon2).abs() < 1e-10);
    }
}
