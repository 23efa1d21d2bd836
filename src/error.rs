//! Error types for the edgequake-datasheet library.
//!
//! A single fatal error type, [`DatasheetError`], covers both endpoints.
//! Conversion is fail-fast: the first page that cannot be rendered or read
//! by the model aborts the request, so there is no per-page error type.
//!
//! Field extraction never returns model errors to its caller. They are logged
//! and the heuristic extractor runs instead (see [`crate::fields`]).

use thiserror::Error;

/// All fatal errors returned by the edgequake-datasheet library.
#[derive(Debug, Error)]
pub enum DatasheetError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The request body or a parameter is missing or malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A `data:` URL could not be decoded.
    #[error("Invalid data URL: {reason}")]
    InvalidDataUrl { reason: String },

    /// The content type (or sniffed file type) is neither an image nor a PDF.
    #[error("Unsupported media type '{content_type}'\nExpected an image or application/pdf.")]
    UnsupportedMediaType { content_type: String },

    /// A local input path does not exist or cannot be read.
    #[error("Cannot read '{path}': {reason}")]
    UnreadableInput { path: String, reason: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// pdfium could not open the document.
    #[error("Document is corrupt or encrypted: {detail}")]
    CorruptDocument { detail: String },

    /// The page selection resolved to nothing.
    #[error("No pages selected (document has {total_pages} pages)")]
    NoPagesSelected { total_pages: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// No model client was configured at startup (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// A single page's vision call failed; the whole conversion is aborted.
    #[error("Page {page} failed: {detail}")]
    PageFailed { page: usize, detail: String },

    /// A guarded call exceeded its deadline.
    #[error("{context} timed out after {secs}s")]
    Timeout { context: String, secs: u64 },

    /// The request was cancelled before it finished.
    #[error("{context} was cancelled")]
    Cancelled { context: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or parameter validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DatasheetError {
    /// True for errors caused by what the caller sent rather than by the
    /// model, the rasteriser or the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DatasheetError::InvalidInput(_)
                | DatasheetError::InvalidDataUrl { .. }
                | DatasheetError::UnsupportedMediaType { .. }
                | DatasheetError::UnreadableInput { .. }
                | DatasheetError::CorruptDocument { .. }
                | DatasheetError::NoPagesSelected { .. }
                | DatasheetError::InvalidConfig(_)
        )
    }
}
