//! HTTP error mapping.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use leith_map_database::DbError;

/// Errors a handler can return. Every variant renders as
/// `{"error": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The store could not be reached.
    #[error("Database connection failed")]
    ConnectionUnavailable,

    /// A query failed or timed out.
    #[error("{0}")]
    Database(DbError),

    /// A request parameter was missing or malformed.
    #[error("{message}")]
    InvalidRequestParameter {
        /// Message returned to the client.
        message: String,
    },

    /// `/api/export/{type}` with an unknown type.
    #[error("Invalid data type")]
    UnsupportedExportType {
        /// The type that was asked for.
        requested: String,
    },

    /// Rendering a response body failed.
    #[error("Failed to render response: {message}")]
    Render {
        /// Underlying error.
        message: String,
    },
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Unavailable { .. } => Self::ConnectionUnavailable,
            other => Self::Database(other),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestParameter { .. } | Self::UnsupportedExportType { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::ConnectionUnavailable | Self::Database(_) | Self::Render { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{self}");
        } else {
            log::debug!("Rejected request: {self}");
        }
        HttpResponse::build(status).json(serde_json::json!({ "error": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_store_maps_to_connection_error() {
        let err = ApiError::from(DbError::Unavailable {
            message: "refused".to_string(),
        });
        assert!(matches!(err, ApiError::ConnectionUnavailable));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn timeout_is_a_server_error() {
        let err = ApiError::from(DbError::Timeout { seconds: 30 });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Database query timed out after 30s");
    }

    #[test]
    fn client_errors_are_bad_request() {
        let err = ApiError::UnsupportedExportType {
            requested: "parcels".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid data type");
    }
}
