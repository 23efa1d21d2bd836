//! Mapping of library errors onto HTTP responses.

use crate::error::DatasheetError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

use super::types::ErrorResponse;

/// An error ready to be sent as `{ error, details? }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details,
        }
    }

    pub fn bad_request(details: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Invalid request", Some(details.into()))
    }

    pub fn unsupported_media_type(content_type: impl Into<String>) -> Self {
        DatasheetError::UnsupportedMediaType {
            content_type: content_type.into(),
        }
        .into()
    }
}

/// 4xx for whatever [`DatasheetError::is_client_error`] blames on the caller,
/// 500 for the rest.
fn status_for(err: &DatasheetError) -> (StatusCode, &'static str) {
    if err.is_client_error() {
        return match err {
            DatasheetError::UnsupportedMediaType { .. } => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported media type")
            }
            DatasheetError::NoPagesSelected { .. } => {
                (StatusCode::BAD_REQUEST, "No pages selected")
            }
            DatasheetError::CorruptDocument { .. } => {
                (StatusCode::BAD_REQUEST, "Document could not be opened")
            }
            _ => (StatusCode::BAD_REQUEST, "Invalid request"),
        };
    }

    let label = match err {
        DatasheetError::ProviderNotConfigured { .. } => "Model provider not configured",
        DatasheetError::PageFailed { .. } | DatasheetError::LlmApiError { .. } => {
            "Model call failed"
        }
        DatasheetError::Timeout { .. } => "Timed out",
        DatasheetError::Cancelled { .. } => "Cancelled",
        DatasheetError::PdfiumBindingFailed(_) | DatasheetError::RasterisationFailed { .. } => {
            "Rasterisation failed"
        }
        _ => "Internal error",
    };
    (StatusCode::INTERNAL_SERVER_ERROR, label)
}

impl From<DatasheetError> for ApiError {
    fn from(err: DatasheetError) -> Self {
        let (status, label) = status_for(&err);
        Self::new(status, label, Some(err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = self.details.as_deref().unwrap_or("");
        if self.status.is_server_error() {
            error!(status = %self.status, "{}: {}", self.error, detail);
        } else {
            warn!(status = %self.status, "{}: {}", self.error, detail);
        }

        let body = ErrorResponse {
            error: self.error,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}
