//! # edgequake-datasheet
//!
//! Pull the tables out of scanned or photographed engineering datasheets with
//! a Vision Language Model, then map them onto a fixed set of named fields.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image / PDF
//!  │
//!  ├─ 1. Input     data URL, multipart upload, local path or URL
//!  ├─ 2. Pages     resolve start/end/include/exclude against the page count
//!  ├─ 3. Render    rasterise selected pages via pdfium (spawn_blocking)
//!  ├─ 4. VLM       one table-transcription call per page, bounded concurrency
//!  ├─ 5. Polish    fence stripping, separator repair, sentinel filtering
//!  └─ 6. Assemble  "## Page N" sections + summed token usage
//!
//! Markdown
//!  │
//!  └─ Extract      model JSON answer, alias reconciliation, heuristic fallback
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_datasheet::{
//!     pipeline::input, resolve_provider, ConversionConfig, ExtractionConfig, FieldSchema,
//!     AliasMap, PdfiumRasterizer, Pipeline,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from EDGEQUAKE_LLM_PROVIDER / OPENAI_API_KEY / ...
//!     let model = resolve_provider(None, None)?;
//!     let pipeline = Pipeline::new(Some(Arc::new(model)), Arc::new(PdfiumRasterizer::from_env()));
//!     let cancel = CancellationToken::new();
//!
//!     let document = input::load_source("pump-datasheet.pdf", 60).await?;
//!     let tables = pipeline
//!         .convert(document, &ConversionConfig::default(), &cancel)
//!         .await?;
//!
//!     let fields = pipeline
//!         .extract(
//!             &tables.markdown,
//!             &FieldSchema::default_schema(),
//!             &AliasMap::new(),
//!             &ExtractionConfig::default(),
//!             &cancel,
//!         )
//!         .await?;
//!     for (name, value) in fields.ordered() {
//!         println!("{name}: {value}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `datasheet` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | [`api`]: axum router for the Convert and Extract endpoints |
//!
//! Library-only users can skip both:
//! ```toml
//! edgequake-datasheet = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

#[cfg(feature = "server")]
pub mod api;
pub mod config;
pub mod convert;
pub mod error;
pub mod fields;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ConversionOverrides, ExtractionConfig};
pub use convert::Pipeline;
pub use error::DatasheetError;
pub use fields::{AliasMap, AliasTarget, FieldSchema, MatchRule};
pub use model::{
    resolve_provider, EdgequakeModel, ImageAttachment, LanguageModel, ModelRequest, ModelResponse,
};
pub use output::{
    ConversionOutput, ExtractionResult, ExtractionSource, PageMarkdown, Usage, UsageAccumulator,
};
pub use pipeline::input::DocumentInput;
pub use pipeline::pages::PageSelection;
pub use pipeline::render::{PdfiumRasterizer, Rasterizer, RenderedPage};
pub use progress::{NoopProgress, PageProgress, ProgressHandle};
