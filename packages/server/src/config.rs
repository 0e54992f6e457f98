//! Server configuration from environment variables and command-line flags.
//!
//! Environment variables supply the base values; any flag given on the
//! command line wins.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use leith_map_database::db::DEFAULT_DATABASE_URL;

/// Runtime configuration for [`crate::run_server`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Port the HTTP server listens on.
    pub port: u16,
    /// Postgres connection URL.
    pub database_url: String,
    /// Path to the postcode boundary `GeoPackage`.
    pub postcode_path: PathBuf,
    /// Layer (table) name inside the `GeoPackage`.
    pub postcode_layer: String,
    /// Directory of static frontend files served at `/`.
    pub frontend_dir: PathBuf,
    /// Limit on each store call, and the session `statement_timeout`.
    pub query_timeout: Duration,
    /// Load the postcode layer at startup instead of on first request.
    pub preload_postcodes: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 55430,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            postcode_path: PathBuf::from("data/Postcode.gpkg"),
            postcode_layer: "postcode".to_string(),
            frontend_dir: PathBuf::from("frontend"),
            query_timeout: Duration::from_secs(30),
            preload_postcodes: false,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

impl ServerConfig {
    /// Reads configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, falling back to defaults for
    /// missing or unparseable values.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            postcode_path: lookup("POSTCODE_GPKG_PATH")
                .map_or(defaults.postcode_path, PathBuf::from),
            postcode_layer: lookup("POSTCODE_LAYER").unwrap_or(defaults.postcode_layer),
            frontend_dir: lookup("FRONTEND_DIR").map_or(defaults.frontend_dir, PathBuf::from),
            query_timeout: lookup("QUERY_TIMEOUT_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|s| *s > 0)
                .map_or(defaults.query_timeout, Duration::from_secs),
            preload_postcodes: lookup("PRELOAD_POSTCODES")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.preload_postcodes),
        }
    }
}

/// Command-line flags. Each overrides the matching environment variable.
#[derive(Debug, Default, Parser)]
#[command(name = "leith_map_server", about = "Water of Leith flood map API server")]
pub struct Cli {
    /// Address to bind (`BIND_ADDR`).
    #[arg(long)]
    pub bind_addr: Option<String>,

    /// Port to listen on (`PORT`).
    #[arg(long)]
    pub port: Option<u16>,

    /// Postgres connection URL (`DATABASE_URL`).
    #[arg(long)]
    pub database_url: Option<String>,

    /// Postcode `GeoPackage` file (`POSTCODE_GPKG_PATH`).
    #[arg(long)]
    pub postcode_path: Option<PathBuf>,

    /// Layer inside the postcode `GeoPackage` (`POSTCODE_LAYER`).
    #[arg(long)]
    pub postcode_layer: Option<String>,

    /// Directory of static frontend files (`FRONTEND_DIR`).
    #[arg(long)]
    pub frontend_dir: Option<PathBuf>,

    /// Per-query time limit in seconds (`QUERY_TIMEOUT_SECS`).
    #[arg(long)]
    pub query_timeout_secs: Option<u64>,

    /// Load postcodes at startup (`PRELOAD_POSTCODES`).
    #[arg(long)]
    pub preload_postcodes: bool,
}

impl Cli {
    /// Applies the given flags on top of `config`.
    #[must_use]
    pub fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(v) = self.bind_addr {
            config.bind_addr = v;
        }
        if let Some(v) = self.port {
            config.port = v;
        }
        if let Some(v) = self.database_url {
            config.database_url = v;
        }
        if let Some(v) = self.postcode_path {
            config.postcode_path = v;
        }
        if let Some(v) = self.postcode_layer {
            config.postcode_layer = v;
        }
        if let Some(v) = self.frontend_dir {
            config.frontend_dir = v;
        }
        if let Some(v) = self.query_timeout_secs.filter(|s| *s > 0) {
            config.query_timeout = Duration::from_secs(v);
        }
        if self.preload_postcodes {
            config.preload_postcodes = true;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        assert_eq!(ServerConfig::from_lookup(|_| None), ServerConfig::default());
        assert_eq!(ServerConfig::default().port, 55430);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("POSTCODE_LAYER", "pc"),
            ("QUERY_TIMEOUT_SECS", "5"),
            ("PRELOAD_POSTCODES", "yes"),
        ]));
        assert_eq!(config.port, 9000);
        assert_eq!(config.postcode_layer, "pc");
        assert_eq!(config.query_timeout, Duration::from_secs(5));
        assert!(config.preload_postcodes);
    }

    #[test]
    fn unparseable_values_fall_back() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "eighty"),
            ("QUERY_TIMEOUT_SECS", "0"),
            ("PRELOAD_POSTCODES", "maybe"),
        ]));
        assert_eq!(config.port, 55430);
        assert_eq!(config.query_timeout, Duration::from_secs(30));
        assert!(!config.preload_postcodes);
    }

    #[test]
    fn flags_win_over_environment() {
        let env = ServerConfig::from_lookup(lookup(&[("PORT", "9000"), ("BIND_ADDR", "0.0.0.0")]));
        let cli = Cli::try_parse_from([
            "leith_map_server",
            "--port",
            "8081",
            "--postcode-path",
            "/srv/Postcode.gpkg",
            "--preload-postcodes",
        ])
        .unwrap();

        let config = cli.apply(env);
        assert_eq!(config.port, 8081);
        assert_eq!(config.bind_addr, "0.0.0.0");
        assert_eq!(config.postcode_path, PathBuf::from("/srv/Postcode.gpkg"));
        assert!(config.preload_postcodes);
    }
}
