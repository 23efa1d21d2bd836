//! PDF rasterisation: count pages and render selected ones via pdfium.
//!
//! The pipeline depends on the [`Rasterizer`] trait, not on pdfium, so the
//! HTTP tests can run without a pdfium shared library. [`PdfiumRasterizer`]
//! is the production implementation.
//!
//! pdfium is a blocking C++ library with thread-local state, so every call
//! runs inside `tokio::task::spawn_blocking`.

use crate::error::DatasheetError;
use crate::pipeline::encode;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Longest edge, in pixels, of any rendered page.
///
/// Applied on top of the scale factor so an oversized page (A0 drawing) stays
/// within what vision models accept.
pub const MAX_RENDERED_EDGE: i32 = 4096;

/// One rendered page ready to be sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// 1-indexed page number in the source document.
    pub page_number: usize,
    pub image_bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

/// Turns a PDF into page images.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Number of pages in `pdf`.
    async fn page_count(&self, pdf: &[u8]) -> Result<usize, DatasheetError>;

    /// Render `pages` (1-indexed) at `scale` × 72 DPI, in the order given.
    async fn render_pages(
        &self,
        pdf: &[u8],
        pages: &[usize],
        scale: f32,
    ) -> Result<Vec<RenderedPage>, DatasheetError>;
}

/// [`Rasterizer`] backed by a pdfium shared library.
///
/// Binds to `library_path` when given, else to the system library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    /// Uses `PDFIUM_LIB_PATH` if set.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var_os("PDFIUM_LIB_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        )
    }

    /// Check that pdfium can be loaded, without opening a document.
    pub fn check_library(&self) -> Result<(), DatasheetError> {
        bind(self.library_path.as_deref()).map(|_| ())
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn page_count(&self, pdf: &[u8]) -> Result<usize, DatasheetError> {
        let library_path = self.library_path.clone();
        let bytes = pdf.to_vec();

        tokio::task::spawn_blocking(move || {
            let pdfium = bind(library_path.as_deref())?;
            let document = open(&pdfium, &bytes)?;
            Ok(document.pages().len() as usize)
        })
        .await
        .map_err(|e| DatasheetError::Internal(format!("Page count task panicked: {}", e)))?
    }

    async fn render_pages(
        &self,
        pdf: &[u8],
        pages: &[usize],
        scale: f32,
    ) -> Result<Vec<RenderedPage>, DatasheetError> {
        let library_path = self.library_path.clone();
        let bytes = pdf.to_vec();
        let pages = pages.to_vec();

        tokio::task::spawn_blocking(move || {
            render_pages_blocking(library_path.as_deref(), &bytes, &pages, scale)
        })
        .await
        .map_err(|e| DatasheetError::Internal(format!("Render task panicked: {}", e)))?
    }
}

fn bind(library_path: Option<&std::path::Path>) -> Result<Pdfium, DatasheetError> {
    let bindings = match library_path {
        Some(path) => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| DatasheetError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn open<'a>(pdfium: &'a Pdfium, bytes: &'a [u8]) -> Result<PdfDocument<'a>, DatasheetError> {
    pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| DatasheetError::CorruptDocument {
            detail: format!("{:?}", e),
        })
}

fn render_pages_blocking(
    library_path: Option<&std::path::Path>,
    bytes: &[u8],
    page_numbers: &[usize],
    scale: f32,
) -> Result<Vec<RenderedPage>, DatasheetError> {
    let pdfium = bind(library_path)?;
    let document = open(&pdfium, bytes)?;
    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages, rendering {}", total_pages, page_numbers.len());

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .set_maximum_width(MAX_RENDERED_EDGE)
        .set_maximum_height(MAX_RENDERED_EDGE);

    let mut results = Vec::with_capacity(page_numbers.len());

    for &page_number in page_numbers {
        if page_number == 0 || page_number > total_pages {
            return Err(DatasheetError::RasterisationFailed {
                page: page_number,
                detail: format!("page out of range (document has {total_pages} pages)"),
            });
        }

        let page = pages
            .get((page_number - 1) as u16)
            .map_err(|e| DatasheetError::RasterisationFailed {
                page: page_number,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            DatasheetError::RasterisationFailed {
                page: page_number,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        let image_bytes =
            encode::encode_png(&image).map_err(|e| DatasheetError::RasterisationFailed {
                page: page_number,
                detail: format!("PNG encoding failed: {}", e),
            })?;
        debug!(
            "Rendered page {} → {}x{} px, {} bytes",
            page_number,
            image.width(),
            image.height(),
            image_bytes.len()
        );

        results.push(RenderedPage {
            page_number,
            width: image.width(),
            height: image.height(),
            image_bytes,
            mime_type: "image/png".to_string(),
        });
    }

    Ok(results)
}
