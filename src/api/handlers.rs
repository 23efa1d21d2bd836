//! API request handlers.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, Multipart, Query, Request, State,
    },
    http::header::CONTENT_TYPE,
    Json,
};
use std::time::Instant;
use tracing::info;

use crate::config::ConversionOverrides;
use crate::fields::FieldSchema;
use crate::pipeline::input::{self, DocumentInput};

use super::{
    error::ApiError,
    types::{
        ApiState, ConvertJsonRequest, ConvertResponse, ExtractRequest, ExtractResponse,
        HealthResponse,
    },
};

/// Convert endpoint handler.
///
/// POST /convert, POST /api/convert
///
/// Accepts either `application/json` with `{ "dataUrl": "data:image/...;base64,..." }`
/// or `multipart/form-data` with one `file` field (an image or a PDF).
/// Query parameters (`maxPages`, `scale`, `start`, `end`, `concurrency`,
/// `pages`, `exclude`) narrow the server defaults; out-of-range numbers are
/// clamped.
pub async fn convert_handler(
    State(state): State<ApiState>,
    query: Result<Query<ConversionOverrides>, QueryRejection>,
    request: Request,
) -> Result<Json<ConvertResponse>, ApiError> {
    let Query(overrides) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let document = if content_type.starts_with("application/json") {
        let Json(body) = Json::<ConvertJsonRequest>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        let data_url = body
            .data_url
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("dataUrl is required"))?;
        input::parse_data_url(&data_url)?
    } else if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        read_upload(multipart).await?
    } else {
        let shown = if content_type.is_empty() {
            "(none)".to_string()
        } else {
            content_type
        };
        return Err(ApiError::unsupported_media_type(shown));
    };

    let config = state.conversion.with_overrides(&overrides);
    let start = Instant::now();
    let cancel = state.shutdown.child_token();
    let output = state.pipeline.convert(document, &config, &cancel).await?;

    info!(
        pages = output.pages.len(),
        total_tokens = output.usage.total_tokens,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Convert request complete"
    );

    Ok(Json(ConvertResponse {
        markdown: output.markdown,
        usage: output.usage,
    }))
}

/// Take the `file` field of a multipart upload.
async fn read_upload(mut multipart: Multipart) -> Result<DocumentInput, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(|s| s.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        return Ok(input::from_upload(data.to_vec(), content_type.as_deref())?);
    }

    Err(ApiError::bad_request("multipart field 'file' is required"))
}

/// Extract endpoint handler.
///
/// POST /extract, POST /api/extract
///
/// Body: `{ "markdown": "...", "fields": [...]?, "aliases": {...}? }`. Without
/// `fields` the default 13-field pump schema is used. An alias value of
/// `null` drops the old key instead of renaming it.
pub async fn extract_handler(
    State(state): State<ApiState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let markdown = body
        .markdown
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("markdown is required"))?;
    let schema = FieldSchema::for_fields(&body.fields.unwrap_or_default());
    let aliases = body.aliases.unwrap_or_default();

    let cancel = state.shutdown.child_token();
    let result = state
        .pipeline
        .extract(&markdown, &schema, &aliases, &state.extraction, &cancel)
        .await?;

    info!(
        fields = result.order.len(),
        source = ?result.source,
        total_tokens = result.usage.total_tokens,
        "Extract request complete"
    );

    Ok(Json(ExtractResponse {
        fields: result.fields,
        order: result.order,
        usage: result.usage,
    }))
}

/// Health check endpoint handler.
///
/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
