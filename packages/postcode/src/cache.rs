//! Load-once postcode cache.
//!
//! The cache starts empty. The first caller of [`PostcodeCache::records`]
//! runs the load on a blocking thread while concurrent callers wait on the
//! same gate. Success is stored for the process lifetime; failure leaves
//! the cache empty so the next call tries again.

use std::path::PathBuf;
use std::sync::Arc;

use geojson::FeatureCollection;
use tokio::sync::OnceCell;

use crate::{AffectedFilter, PostcodeError, PostcodeRecord, find, gpkg, list};

/// Something that can produce the full set of postcode records.
///
/// Called from a blocking thread, at most once per successful load.
pub trait PostcodeSource: Send + Sync {
    /// Reads every record.
    ///
    /// # Errors
    ///
    /// Returns [`PostcodeError`] if the backing store cannot be read.
    fn load(&self) -> Result<Vec<PostcodeRecord>, PostcodeError>;

    /// Human-readable location for log lines.
    fn describe(&self) -> String;
}

/// Reads a named layer from a `GeoPackage` file.
#[derive(Debug, Clone)]
pub struct GeoPackageSource {
    /// File path.
    pub path: PathBuf,
    /// Layer (table) name.
    pub layer: String,
}

impl PostcodeSource for GeoPackageSource {
    fn load(&self) -> Result<Vec<PostcodeRecord>, PostcodeError> {
        gpkg::read_layer(&self.path, &self.layer)
    }

    fn describe(&self) -> String {
        format!("{} (layer '{}')", self.path.display(), self.layer)
    }
}

/// Process-wide postcode boundaries.
pub struct PostcodeCache {
    source: Arc<dyn PostcodeSource>,
    records: OnceCell<Vec<PostcodeRecord>>,
}

impl std::fmt::Debug for PostcodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostcodeCache")
            .field("source", &self.source.describe())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl PostcodeCache {
    /// Creates an empty cache over `source`. Nothing is read yet.
    #[must_use]
    pub fn new(source: impl PostcodeSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
            records: OnceCell::new(),
        }
    }

    /// Creates an empty cache over a `GeoPackage` layer.
    #[must_use]
    pub fn from_geopackage(path: impl Into<PathBuf>, layer: impl Into<String>) -> Self {
        Self::new(GeoPackageSource {
            path: path.into(),
            layer: layer.into(),
        })
    }

    /// Whether a load has completed successfully.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.records.initialized()
    }

    /// Returns the cached records, loading them first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`PostcodeError`] if this call performed the load and it
    /// failed.
    pub async fn records(&self) -> Result<&[PostcodeRecord], PostcodeError> {
        let records = self
            .records
            .get_or_try_init(|| async {
                let source = Arc::clone(&self.source);
                log::info!("Loading postcode boundaries from {}", source.describe());

                let records = tokio::task::spawn_blocking(move || source.load())
                    .await
                    .map_err(|e| PostcodeError::Task {
                        message: e.to_string(),
                    })?
                    .inspect_err(|e| log::error!("Postcode load failed: {e}"))?;

                log::info!("Loaded {} postcode boundaries", records.len());
                Ok::<_, PostcodeError>(records)
            })
            .await?;

        Ok(records.as_slice())
    }

    /// Lists postcode boundaries passing `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`PostcodeError`] if the cache could not be loaded.
    pub async fn list(&self, filter: AffectedFilter) -> Result<FeatureCollection, PostcodeError> {
        Ok(list(self.records().await?, filter))
    }

    /// Looks up a single postcode. `Ok(None)` means loaded but no match.
    ///
    /// # Errors
    ///
    /// Returns [`PostcodeError`] if the cache could not be loaded.
    pub async fn search(&self, query: &str) -> Result<Option<&PostcodeRecord>, PostcodeError> {
        Ok(find(self.records().await?, query))
    }
}
