//! HTTP API for the Convert and Extract endpoints.
//!
//! | Method | Path                         | Body                                   |
//! |--------|------------------------------|----------------------------------------|
//! | POST   | `/convert`, `/api/convert`   | JSON `{dataUrl}` or multipart `file`   |
//! | POST   | `/extract`, `/api/extract`   | JSON `{markdown, fields?, aliases?}`   |
//! | GET    | `/health`                    |                                        |
//!
//! Errors are returned as `{ "error": "...", "details": "..." }` with 400 for
//! bad input, 415 for unsupported media and 500 for upstream failures.
//!
//! # Example
//!
//! ```no_run
//! use edgequake_datasheet::api::{serve, ApiState, ServerConfig};
//! use edgequake_datasheet::{ConversionConfig, ExtractionConfig, Pipeline, PdfiumRasterizer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), edgequake_datasheet::DatasheetError> {
//!     let model = edgequake_datasheet::resolve_provider(None, None)?;
//!     let pipeline = Pipeline::new(Some(Arc::new(model)), Arc::new(PdfiumRasterizer::from_env()));
//!     let state = ApiState::new(pipeline, ConversionConfig::default(), ExtractionConfig::default());
//!     serve(ServerConfig::default(), state).await
//! }
//! ```

mod error;
mod handlers;
mod server;
mod types;

pub use error::ApiError;
pub use handlers::{convert_handler, extract_handler, health_handler};
pub use server::{create_router, serve, CORS_ORIGINS_ENV};
pub use types::{
    ApiSizeLimits, ApiState, ConvertJsonRequest, ConvertResponse, ErrorResponse, ExtractRequest,
    ExtractResponse, HealthResponse, ServerConfig,
};
