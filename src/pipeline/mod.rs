//! Pipeline stages for document-to-Markdown table conversion.
//!
//! Each submodule implements one step. The rasteriser and the model sit
//! behind traits ([`render::Rasterizer`], [`crate::LanguageModel`]).
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ pages ──▶ render ──▶ dispatch(llm) ──▶ postprocess
//! (bytes)   (select)  (pdfium)   (bounded VLM)     (clean + join)
//! ```
//!
//! 1. [`input`]   : classify a data URL, upload, path or URL as image or PDF
//! 2. [`pages`]   : resolve the page selection against the page count
//! 3. [`render`]  : rasterise selected pages; runs in `spawn_blocking`
//! 4. [`encode`]  : PNG-encode and base64-wrap images for the model request
//! 5. [`dispatch`]: run page calls with a concurrency cap, in page order
//! 6. [`llm`]     : one vision call per page, guarded by timeout and cancellation
//! 7. [`postprocess`]: cleanup rules, sentinel filtering, assembly

pub mod dispatch;
pub mod encode;
pub mod input;
pub mod llm;
pub mod pages;
pub mod postprocess;
pub mod render;
