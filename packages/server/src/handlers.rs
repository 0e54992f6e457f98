//! HTTP handler functions for the flood map API.

use std::str::FromStr as _;

use actix_web::http::header;
use actix_web::{HttpResponse, web};
use leith_map_database::queries;
use leith_map_flood_models::{ExportFormat, ExportType};
use leith_map_geometry::{assemble, assemble_flood_damage};
use leith_map_postcode::{AffectedFilter, PostcodeCache, normalize_query};
use leith_map_server_models::{
    ApiHealth, ApiIndex, ApiPostcodeHit, ApiPostcodeMiss, ApiRankedGreenspace, ExportParams,
    FloodDamageParams, FloodZoneParams, GreenspaceParams, PostcodeListParams,
    PostcodeSearchParams, RankingParams, SimdZoneParams,
};
use serde_json::json;

use crate::error::ApiError;
use crate::{AppState, export};

const SIMD_NOTE: &str =
    "Using SIMD_DECILE for classification (1=most deprived, 10=least deprived)";

/// `GET /api`
pub async fn index() -> HttpResponse {
    let list = |items: &[&str]| -> Vec<String> { items.iter().map(ToString::to_string).collect() };

    HttpResponse::Ok().json(ApiIndex {
        name: "Water of Leith WebMap API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        features: list(&[
            "SIMD decile filter",
            "Zoning (area) filter",
            "Data export",
            "Chart interaction",
            "Postcode search",
        ]),
        endpoints: list(&[
            "/api/study_area",
            "/api/simd_zones",
            "/api/greenspaces",
            "/api/flood_zones",
            "/api/flood_damage",
            "/api/summary",
            "/api/damage_by_category",
            "/api/greenspace_ranking",
            "/api/postcodes",
            "/api/postcode/search",
            "/api/export/<type>",
            "/api/health",
        ]),
    })
}

/// `GET /api/health`
///
/// Reports whether the store answers a trivial query.
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    match state
        .query(|db| async move { queries::ping(db.as_ref()).await })
        .await
    {
        Ok(()) => HttpResponse::Ok().json(ApiHealth {
            status: "healthy".to_string(),
            database: "connected".to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }),
        Err(e) => {
            log::warn!("Health check failed: {e}");
            HttpResponse::InternalServerError().json(ApiHealth {
                status: "unhealthy".to_string(),
                database: "disconnected".to_string(),
                version: None,
            })
        }
    }
}

/// `GET /api/study_area`
pub async fn study_area(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rows = state
        .query(|db| async move { queries::fetch_study_area(db.as_ref()).await })
        .await?;

    Ok(HttpResponse::Ok().json(assemble(&rows).into_collection(None)))
}

/// `GET /api/simd_zones`
///
/// Data zones filtered by risk band and decile range.
pub async fn simd_zones(
    state: web::Data<AppState>,
    params: web::Query<SimdZoneParams>,
) -> Result<HttpResponse, ApiError> {
    let filter = params.to_filter();
    let rows = state
        .query(|db| async move { queries::fetch_simd_zones(db.as_ref(), &filter).await })
        .await?;

    let assembly = assemble(&rows);
    let metadata = json!({
        "total_count": assembly.features.len(),
        "filter": params.risk_level,
        "note": SIMD_NOTE,
    });

    Ok(HttpResponse::Ok().json(assembly.into_collection(metadata.as_object().cloned())))
}

/// `GET /api/greenspaces`
pub async fn greenspaces(
    state: web::Data<AppState>,
    params: web::Query<GreenspaceParams>,
) -> Result<HttpResponse, ApiError> {
    let filter = params.to_filter();
    let rows = state
        .query(|db| async move { queries::fetch_greenspaces(db.as_ref(), &filter).await })
        .await?;

    Ok(HttpResponse::Ok().json(assemble(&rows).into_collection(None)))
}

/// `GET /api/flood_zones`
pub async fn flood_zones(
    state: web::Data<AppState>,
    params: web::Query<FloodZoneParams>,
) -> Result<HttpResponse, ApiError> {
    let filter = params.to_filter();
    let rows = state
        .query(|db| async move { queries::fetch_flood_zones(db.as_ref(), &filter).await })
        .await?;

    Ok(HttpResponse::Ok().json(assemble(&rows).into_collection(None)))
}

/// `GET /api/flood_damage`
///
/// Damaged buildings, with the protection value range of the returned
/// features in `metadata`.
pub async fn flood_damage(
    state: web::Data<AppState>,
    params: web::Query<FloodDamageParams>,
) -> Result<HttpResponse, ApiError> {
    let filter = params.to_filter();
    let rows = state
        .query(|db| async move { queries::fetch_flood_damage(db.as_ref(), &filter).await })
        .await?;

    let (assembly, range) = assemble_flood_damage(&rows);
    let metadata = json!({
        "max_protection_value": range.max(),
        "min_protection_value": range.min(),
        "total_count": assembly.features.len(),
    });

    Ok(HttpResponse::Ok().json(assembly.into_collection(metadata.as_object().cloned())))
}

/// `GET /api/summary`
pub async fn summary(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let totals = state
        .query(|db| async move { queries::fetch_summary(db.as_ref()).await })
        .await?;

    Ok(HttpResponse::Ok().json(totals))
}

/// `GET /api/damage_by_category`
pub async fn damage_by_category(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let categories = state
        .query(|db| async move { queries::fetch_damage_by_category(db.as_ref()).await })
        .await?;

    Ok(HttpResponse::Ok().json(categories))
}

/// `GET /api/greenspace_ranking`
pub async fn greenspace_ranking(
    state: web::Data<AppState>,
    params: web::Query<RankingParams>,
) -> Result<HttpResponse, ApiError> {
    let limit = params.limit();
    let rows = state
        .query(|db| async move { queries::fetch_greenspace_ranking(db.as_ref(), limit).await })
        .await?;

    let ranking: Vec<ApiRankedGreenspace> =
        rows.into_iter().map(ApiRankedGreenspace::from).collect();
    Ok(HttpResponse::Ok().json(ranking))
}

/// `GET /api/export/{type}`
///
/// Full table download as CSV, or as a JSON array with `format=json`.
pub async fn export_data(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<ExportParams>,
) -> Result<HttpResponse, ApiError> {
    let requested = path.into_inner();
    let export_type =
        ExportType::from_str(&requested).map_err(|_| ApiError::UnsupportedExportType {
            requested: requested.clone(),
        })?;
    let format = ExportFormat::from_param(params.format.as_deref());

    let table = state
        .query(|db| async move { queries::fetch_export(db.as_ref(), export_type).await })
        .await?;

    match format {
        ExportFormat::Json => Ok(HttpResponse::Ok().json(export::to_json(&table))),
        ExportFormat::Csv => {
            let body = export::to_csv(&table).map_err(|e| ApiError::Render {
                message: e.to_string(),
            })?;
            Ok(HttpResponse::Ok()
                .content_type("text/csv")
                .insert_header((
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename={}.csv", table.file_stem),
                ))
                .body(body))
        }
    }
}

/// `GET /api/postcodes`
///
/// Cached postcode boundaries, optionally filtered by `affected_count`.
/// A failed load answers with an empty collection and the error.
pub async fn postcodes(
    cache: web::Data<PostcodeCache>,
    params: web::Query<PostcodeListParams>,
) -> HttpResponse {
    let filter = AffectedFilter::from_param(params.filter.as_deref());

    match cache.list(filter).await {
        Ok(collection) => HttpResponse::Ok().json(collection),
        Err(e) => {
            log::error!("Failed to load postcodes: {e}");
            HttpResponse::InternalServerError().json(json!({
                "type": "FeatureCollection",
                "features": [],
                "error": e.to_string(),
            }))
        }
    }
}

/// `GET /api/postcode/search`
pub async fn postcode_search(
    cache: web::Data<PostcodeCache>,
    params: web::Query<PostcodeSearchParams>,
) -> HttpResponse {
    let postcode = params
        .postcode
        .as_deref()
        .map(normalize_query)
        .unwrap_or_default();

    if postcode.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "error": "Please provide a postcode",
            "found": false,
        }));
    }

    match cache.search(&postcode).await {
        Ok(Some(record)) => HttpResponse::Ok().json(ApiPostcodeHit {
            found: true,
            postcode: record.postcode().unwrap_or_else(|| postcode.clone()),
            district: record.attribute("District"),
            sector: record.attribute("Sector"),
            geometry: record.geometry.clone(),
            affected_buildings: record.attribute_or_zero("affected_count"),
            total_damage: record.attribute_or_zero("total_damage"),
            protection_value: record.attribute_or_zero("protection_value"),
            buildings: Vec::new(),
        }),
        Ok(None) => HttpResponse::Ok().json(ApiPostcodeMiss {
            found: false,
            postcode,
            message: "Postcode not found in study area".to_string(),
        }),
        Err(e) => {
            log::error!("Postcode search failed: {e}");
            HttpResponse::InternalServerError().json(json!({
                "error": e.to_string(),
                "found": false,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use actix_web::{App, test};
    use leith_map_database::db::DbConnector;
    use leith_map_postcode::{PostcodeError, PostcodeRecord, PostcodeSource};
    use serde_json::Value;

    use super::*;

    struct FixedSource(Vec<PostcodeRecord>);

    impl PostcodeSource for FixedSource {
        fn load(&self) -> Result<Vec<PostcodeRecord>, PostcodeError> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    struct BrokenSource;

    impl PostcodeSource for BrokenSource {
        fn load(&self) -> Result<Vec<PostcodeRecord>, PostcodeError> {
            Err(PostcodeError::MissingLayer {
                layer: "postcode".to_string(),
            })
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    fn record(postcode: &str, affected: i64) -> PostcodeRecord {
        let properties = json!({
            "Postcode": postcode,
            "District": "EH11",
            "Sector": "EH11 2",
            "affected_count": affected,
            "total_damage": 1500.0,
        });
        PostcodeRecord {
            properties: properties.as_object().cloned().unwrap(),
            geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
                -3.24, 55.93,
            ]))),
        }
    }

    fn fixed_cache() -> web::Data<PostcodeCache> {
        web::Data::new(PostcodeCache::new(FixedSource(vec![
            record("EH11 2NA", 3),
            record("EH11 2NB", 0),
        ])))
    }

    fn unreachable_state() -> web::Data<AppState> {
        web::Data::new(AppState {
            db: DbConnector::new("not a database url", Duration::from_secs(2)),
            query_timeout: Duration::from_secs(2),
        })
    }

    #[actix_web::test]
    async fn search_without_postcode_is_bad_request() {
        let app = test::init_service(
            App::new()
                .app_data(fixed_cache())
                .route("/api/postcode/search", web::get().to(postcode_search)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/postcode/search")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["found"], json!(false));
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn search_is_space_insensitive() {
        let app = test::init_service(
            App::new()
                .app_data(fixed_cache())
                .route("/api/postcode/search", web::get().to(postcode_search)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/postcode/search?postcode=eh112na")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["found"], json!(true));
        assert_eq!(body["postcode"], json!("EH11 2NA"));
        assert_eq!(body["district"], json!("EH11"));
        assert_eq!(body["affected_buildings"], json!(3));
        assert_eq!(body["protection_value"], json!(0));
        assert_eq!(body["buildings"], json!([]));
        assert_eq!(body["geometry"]["type"], json!("Point"));
    }

    #[actix_web::test]
    async fn search_miss_is_not_an_error() {
        let app = test::init_service(
            App::new()
                .app_data(fixed_cache())
                .route("/api/postcode/search", web::get().to(postcode_search)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/postcode/search?postcode=G1%201AA")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["found"], json!(false));
        assert_eq!(body["postcode"], json!("G1 1AA"));
    }

    #[actix_web::test]
    async fn postcode_listing_filters_by_affected_count() {
        let app = test::init_service(
            App::new()
                .app_data(fixed_cache())
                .route("/api/postcodes", web::get().to(postcodes)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/postcodes?filter=unaffected")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["type"], json!("FeatureCollection"));
        assert_eq!(body["features"].as_array().map(Vec::len), Some(1));
        assert_eq!(
            body["features"][0]["properties"]["Postcode"],
            json!("EH11 2NB")
        );

        let req = test::TestRequest::get()
            .uri("/api/postcodes?filter=whatever")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["features"].as_array().map(Vec::len), Some(2));
    }

    #[actix_web::test]
    async fn failed_postcode_load_degrades_to_empty_collection() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(PostcodeCache::new(BrokenSource)))
                .route("/api/postcodes", web::get().to(postcodes))
                .route("/api/postcode/search", web::get().to(postcode_search)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/postcodes").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 500);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["features"], json!([]));
        assert!(body["error"].is_string());

        let req = test::TestRequest::get()
            .uri("/api/postcode/search?postcode=EH11")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 500);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["found"], json!(false));
    }

    #[actix_web::test]
    async fn unknown_export_type_is_rejected_before_touching_the_store() {
        let app = test::init_service(
            App::new()
                .app_data(unreachable_state())
                .route("/api/export/{type}", web::get().to(export_data)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/export/parcels?format=json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], json!("Invalid data type"));
    }

    #[actix_web::test]
    async fn unreachable_store_is_a_server_error() {
        let app = test::init_service(
            App::new()
                .app_data(unreachable_state())
                .route("/api/summary", web::get().to(summary))
                .route("/api/health", web::get().to(health)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/summary").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 500);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 500);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], json!("unhealthy"));
        assert_eq!(body["database"], json!("disconnected"));
    }

    #[actix_web::test]
    async fn index_lists_endpoints() {
        let app = test::init_service(App::new().route("/api", web::get().to(index))).await;

        let req = test::TestRequest::get().uri("/api").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["name"], json!("Water of Leith WebMap API"));
        assert_eq!(body["endpoints"].as_array().map(Vec::len), Some(12));
    }
}
