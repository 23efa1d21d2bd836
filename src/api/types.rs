//! API request and response types.

use crate::config::{ConversionConfig, ExtractionConfig};
use crate::convert::Pipeline;
use crate::fields::AliasMap;
use crate::output::Usage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Request body size limit.
///
/// Enforced by both `DefaultBodyLimit` (multipart and JSON extractors) and
/// `RequestBodyLimitLayer` (raw body). Oversized requests get HTTP 413.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiSizeLimits {
    /// Default: 50 MB.
    pub max_request_body_bytes: usize,
}

impl Default for ApiSizeLimits {
    fn default() -> Self {
        Self::from_mb(50)
    }
}

impl ApiSizeLimits {
    pub fn from_mb(max_request_body_mb: usize) -> Self {
        Self {
            max_request_body_bytes: max_request_body_mb.saturating_mul(1024 * 1024),
        }
    }
}

/// Where and how the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub limits: ApiSizeLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            limits: ApiSizeLimits::default(),
        }
    }
}

/// State shared by every handler.
///
/// Per-request cancellation tokens are children of `shutdown`, so stopping
/// the server cancels in-flight model calls.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
    pub conversion: Arc<ConversionConfig>,
    pub extraction: Arc<ExtractionConfig>,
    pub shutdown: CancellationToken,
}

impl ApiState {
    pub fn new(
        pipeline: Pipeline,
        conversion: ConversionConfig,
        extraction: ExtractionConfig,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            conversion: Arc::new(conversion),
            extraction: Arc::new(extraction),
            shutdown: CancellationToken::new(),
        }
    }
}

/// JSON body of the Convert endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertJsonRequest {
    pub data_url: Option<String>,
}

/// Convert endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub markdown: String,
    pub usage: Usage,
}

/// Extract endpoint request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractRequest {
    pub markdown: Option<String>,
    pub fields: Option<Vec<String>>,
    pub aliases: Option<AliasMap>,
}

/// Extract endpoint response. `fields` holds exactly the names in `order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub fields: BTreeMap<String, String>,
    pub order: Vec<String>,
    pub usage: Usage,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
