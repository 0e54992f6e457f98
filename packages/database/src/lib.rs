#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Database access for the Leith flood map.
//!
//! The flood-modelling tables are read-only from this service's point of
//! view. All queries go through `query_raw_params()`; request-supplied
//! values are always bound as parameters via [`filter::SelectQuery`] and
//! never spliced into SQL text.

pub mod db;
pub mod filter;
pub mod queries;

use std::time::Duration;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// No connection to the store could be established.
    #[error("Database connection failed: {message}")]
    Unavailable {
        /// Underlying connection error.
        message: String,
    },

    /// A query did not complete within the configured limit.
    #[error("Database query timed out after {seconds}s")]
    Timeout {
        /// Configured limit in seconds.
        seconds: u64,
    },

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Runs a database future under a time limit.
///
/// # Errors
///
/// Returns [`DbError::Timeout`] if `limit` elapses first, otherwise the
/// future's own result.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, DbError>
where
    F: Future<Output = Result<T, DbError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| DbError::Timeout {
            seconds: limit.as_secs(),
        })?
}
