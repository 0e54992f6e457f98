#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the Water of Leith flood map.
//!
//! Serves the flood-modelling datasets as `GeoJSON` from Postgres, the
//! postcode boundaries from an in-memory cache over a `GeoPackage` file,
//! and the static frontend. The database connection is opened lazily so
//! the server starts (and serves postcodes and static files) even while
//! the store is down.

pub mod config;
pub mod error;
pub mod export;
mod handlers;

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{App, HttpServer, middleware, web};
use leith_map_database::db::DbConnector;
use leith_map_database::{DbError, with_timeout};
use leith_map_postcode::PostcodeCache;
use switchy_database::Database;

pub use config::{Cli, ServerConfig};

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Lazily-opened Postgres connection.
    pub db: DbConnector,
    /// Limit applied to each store round trip, connect included.
    pub query_timeout: Duration,
}

impl AppState {
    /// Acquires the connection and runs `f` on it under the query timeout.
    ///
    /// A failed or timed-out query drops the shared connection so the next
    /// request reconnects.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if no connection is available, the query fails,
    /// or the timeout elapses.
    pub async fn query<T, F, Fut>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(Arc<dyn Database>) -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        let result = with_timeout(self.query_timeout, async {
            let db = self.db.acquire().await?;
            f(db).await
        })
        .await;

        if matches!(result, Err(DbError::Database(_) | DbError::Timeout { .. })) {
            self.db.reset().await;
        }

        result
    }
}

/// Registers the `/api` routes.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("", web::get().to(handlers::index))
            .route("/", web::get().to(handlers::index))
            .route("/health", web::get().to(handlers::health))
            .route("/study_area", web::get().to(handlers::study_area))
            .route("/simd_zones", web::get().to(handlers::simd_zones))
            .route("/greenspaces", web::get().to(handlers::greenspaces))
            .route("/flood_zones", web::get().to(handlers::flood_zones))
            .route("/flood_damage", web::get().to(handlers::flood_damage))
            .route("/summary", web::get().to(handlers::summary))
            .route(
                "/damage_by_category",
                web::get().to(handlers::damage_by_category),
            )
            .route(
                "/greenspace_ranking",
                web::get().to(handlers::greenspace_ranking),
            )
            .route("/export/{type}", web::get().to(handlers::export_data))
            .route("/postcodes", web::get().to(handlers::postcodes))
            .route("/postcode/search", web::get().to(handlers::postcode_search)),
    );
}

/// Starts the flood map API server.
///
/// Builds the (unconnected) database handle and the postcode cache,
/// optionally preloads postcodes, then runs the Actix-Web HTTP server.
/// The caller provides the async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: ServerConfig) -> std::io::Result<()> {
    log::info!(
        "Database: {}, query timeout {}s",
        redact_url(&config.database_url),
        config.query_timeout.as_secs()
    );

    let state = web::Data::new(AppState {
        db: DbConnector::new(config.database_url.clone(), config.query_timeout),
        query_timeout: config.query_timeout,
    });

    let postcodes = web::Data::new(PostcodeCache::from_geopackage(
        config.postcode_path.clone(),
        config.postcode_layer.clone(),
    ));

    if config.preload_postcodes {
        log::info!("Preloading postcode boundaries...");
        if let Err(e) = postcodes.records().await {
            log::warn!("Postcode preload failed, will retry on first request: {e}");
        }
    }

    let frontend_dir = config.frontend_dir.clone();
    log::info!("Serving frontend from {}", frontend_dir.display());
    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .app_data(postcodes.clone())
            .configure(configure_api)
            // Serve frontend static files (index, css, js, images, 3d_models)
            .service(Files::new("/", frontend_dir.clone()).index_file("index.html"))
    })
    .bind((config.bind_addr, config.port))?
    .run()
    .await
}

/// Hides the password component of a connection URL for logging.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((userinfo, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    let user = userinfo.split(':').next().unwrap_or_default();
    format!("{scheme}://{user}:***@{host}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passwords_are_redacted() {
        assert_eq!(
            redact_url("postgres://leith:secret@db:5432/leith_map"),
            "postgres://leith:***@db:5432/leith_map"
        );
        assert_eq!(redact_url("postgres://db/leith"), "postgres://db/leith");
    }

    #[actix_web::test]
    async fn unreachable_store_fails_within_timeout() {
        let state = AppState {
            db: DbConnector::new("not a database url", Duration::from_secs(1)),
            query_timeout: Duration::from_secs(1),
        };
        let result = state
            .query(|db| async move { leith_map_database::queries::ping(db.as_ref()).await })
            .await;
        assert!(result.is_err());
    }
}
