//! Orchestration: the [`Pipeline`] that runs conversion and extraction.
//!
//! A `Pipeline` is built once at startup with the model client and the
//! rasteriser and then shared (behind an `Arc`) by every request. It holds
//! no per-request state: page selections, usage counters and cancellation
//! tokens are created per call.

use crate::config::{ConversionConfig, ExtractionConfig};
use crate::error::DatasheetError;
use crate::fields::{extract_fields, AliasMap, FieldSchema};
use crate::model::LanguageModel;
use crate::output::{ConversionOutput, ExtractionResult, UsageAccumulator};
use crate::pipeline::dispatch::dispatch;
use crate::pipeline::input::DocumentInput;
use crate::pipeline::render::{Rasterizer, RenderedPage};
use crate::pipeline::{encode, llm, postprocess};
use crate::progress::{PageProgress, ProgressHandle};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The conversion and extraction engine.
#[derive(Clone)]
pub struct Pipeline {
    model: Option<Arc<dyn LanguageModel>>,
    rasterizer: Arc<dyn Rasterizer>,
    progress: Option<ProgressHandle>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// `model` is `None` when no provider could be configured; conversion
    /// then fails and extraction runs heuristics only.
    pub fn new(model: Option<Arc<dyn LanguageModel>>, rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self {
            model,
            rasterizer,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn model(&self) -> Option<&Arc<dyn LanguageModel>> {
        self.model.as_ref()
    }

    /// Convert an image or PDF into table Markdown.
    ///
    /// PDFs are resolved against `config.pages`, rendered at `config.scale`
    /// and sent page by page with at most `config.concurrency` calls in
    /// flight. Any failed page fails the whole conversion.
    ///
    /// # Errors
    /// - [`DatasheetError::ProviderNotConfigured`] without a model
    /// - [`DatasheetError::NoPagesSelected`] when the selection is empty
    /// - rasterisation, page, timeout and cancellation errors as they occur
    pub async fn convert(
        &self,
        input: DocumentInput,
        config: &ConversionConfig,
        cancel: &CancellationToken,
    ) -> Result<ConversionOutput, DatasheetError> {
        let total_start = Instant::now();
        let model = self
            .model
            .as_deref()
            .ok_or_else(|| DatasheetError::ProviderNotConfigured {
                provider: "none".to_string(),
                hint: "Set OPENAI_API_KEY, or EDGEQUAKE_LLM_PROVIDER and EDGEQUAKE_MODEL, and restart."
                    .to_string(),
            })?;

        info!("Starting conversion: {} ({} bytes)", input.kind(), input.len());
        let paginated = input.is_paginated();

        // ── Step 1: Select pages ─────────────────────────────────────────────
        let (units, pdf, total_pages) = match input {
            DocumentInput::Image { bytes, mime_type } => {
                let (width, height) = encode::image_dimensions(&bytes).unwrap_or_else(|e| {
                    debug!("Image dimensions unavailable: {}", e);
                    (0, 0)
                });
                let page = RenderedPage {
                    page_number: 1,
                    image_bytes: bytes,
                    mime_type,
                    width,
                    height,
                };
                (vec![PageUnit::Rendered(page)], None, 1)
            }
            DocumentInput::Pdf { bytes } => {
                let total_pages = self.rasterizer.page_count(&bytes).await?;
                let selection = config.pages.resolve(total_pages, config.max_pages)?;
                info!(
                    "PDF has {} pages, converting {:?}",
                    total_pages, selection.pages
                );
                let units = selection.pages.into_iter().map(PageUnit::Pdf).collect();
                (units, Some(bytes), total_pages)
            }
        };
        if cancel.is_cancelled() {
            return Err(DatasheetError::Cancelled {
                context: "conversion".to_string(),
            });
        }

        // ── Step 2: Render + vision call, page by page ───────────────────────
        let selected = units.len();
        let progress: Option<&dyn PageProgress> = self.progress.as_deref();
        if let Some(p) = progress {
            p.on_conversion_start(selected);
        }

        let rasterizer = self.rasterizer.as_ref();
        let pdf = pdf.as_deref().unwrap_or_default();
        let usage = UsageAccumulator::new();
        let usage_ref = &usage;
        let pages = dispatch(units, config.concurrency, cancel, |unit| async move {
            let page_num = unit.page_number();
            if let Some(p) = progress {
                p.on_page_start(page_num, selected);
            }
            let page = match unit {
                PageUnit::Rendered(page) => Ok(page),
                PageUnit::Pdf(n) => render_page(rasterizer, pdf, n, config.scale, cancel).await,
            };
            let result = match page {
                Ok(page) => llm::process_page(model, page, config, usage_ref, cancel).await,
                Err(e) => Err(e),
            };
            if let Some(p) = progress {
                match &result {
                    Ok(page) => p.on_page_complete(page_num, selected, page.markdown.len()),
                    Err(e) => p.on_page_error(page_num, selected, &e.to_string()),
                }
            }
            result
        })
        .await
        .inspect_err(|e| warn!("Conversion aborted: {}", e))?;

        // ── Step 3: Assemble ─────────────────────────────────────────────────
        let markdown = postprocess::assemble(&pages, paginated);
        let tables_found = pages
            .iter()
            .filter(|p| !postprocess::is_no_tables(&p.markdown))
            .count();
        let usage = usage.snapshot();
        let duration_ms = total_start.elapsed().as_millis() as u64;

        info!(
            "Conversion complete: tables on {}/{} pages, {} tokens, {}ms",
            tables_found, selected, usage.total_tokens, duration_ms
        );
        if let Some(p) = progress {
            p.on_conversion_complete(selected, tables_found);
        }

        Ok(ConversionOutput {
            markdown,
            usage,
            pages,
            total_pages,
            duration_ms,
        })
    }

    /// Map table Markdown onto `schema`.
    ///
    /// # Errors
    /// [`DatasheetError::InvalidInput`] when `markdown` is blank. Model
    /// failures are not errors; they fall back to the heuristic extractor.
    pub async fn extract(
        &self,
        markdown: &str,
        schema: &FieldSchema,
        aliases: &AliasMap,
        config: &ExtractionConfig,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult, DatasheetError> {
        if markdown.trim().is_empty() {
            return Err(DatasheetError::InvalidInput("markdown is required".into()));
        }
        info!(
            "Extracting {} fields from {} chars of markdown",
            schema.len(),
            markdown.chars().count()
        );
        Ok(extract_fields(self.model.as_deref(), markdown, schema, aliases, config, cancel).await)
    }
}

/// One page of work: an image that needs no rendering, or a PDF page number
/// rendered right before its vision call.
enum PageUnit {
    Rendered(RenderedPage),
    Pdf(usize),
}

impl PageUnit {
    fn page_number(&self) -> usize {
        match self {
            PageUnit::Rendered(page) => page.page_number,
            PageUnit::Pdf(page_num) => *page_num,
        }
    }
}

async fn render_page(
    rasterizer: &dyn Rasterizer,
    pdf: &[u8],
    page_num: usize,
    scale: f32,
    cancel: &CancellationToken,
) -> Result<RenderedPage, DatasheetError> {
    if cancel.is_cancelled() {
        return Err(DatasheetError::Cancelled {
            context: format!("page {page_num} rendering"),
        });
    }
    let start = Instant::now();
    let page = rasterizer
        .render_pages(pdf, &[page_num], scale)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| DatasheetError::RasterisationFailed {
            page: page_num,
            detail: "renderer returned no image".to_string(),
        })?;
    debug!(
        "Rendered page {} ({}x{}) in {}ms",
        page_num,
        page.width,
        page.height,
        start.elapsed().as_millis()
    );
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelRequest, ModelResponse};
    use crate::output::{ExtractionSource, Usage};
    use crate::prompts::{NO_TABLES_IN_DOCUMENT, NO_TABLES_IN_IMAGE};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers with the page image's first byte as a table cell.
    struct TableModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for TableModel {
        fn name(&self) -> &str {
            "table"
        }

        async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, DatasheetError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let image = &request.images[0];
            let content = if image.data == "AAM=" {
                NO_TABLES_IN_IMAGE.to_string()
            } else {
                format!("| image | {} |\n| --- | --- |", image.data)
            };
            Ok(ModelResponse {
                content,
                usage: Usage::new(10, 5),
            })
        }
    }

    /// Renders page N as the bytes `[0, N]`.
    struct FakeRasterizer {
        pages: usize,
        rendered: Mutex<Vec<Vec<usize>>>,
    }

    #[async_trait]
    impl Rasterizer for FakeRasterizer {
        async fn page_count(&self, _pdf: &[u8]) -> Result<usize, DatasheetError> {
            Ok(self.pages)
        }

        async fn render_pages(
            &self,
            _pdf: &[u8],
            pages: &[usize],
            _scale: f32,
        ) -> Result<Vec<RenderedPage>, DatasheetError> {
            self.rendered.lock().unwrap().push(pages.to_vec());
            Ok(pages
                .iter()
                .map(|&n| RenderedPage {
                    page_number: n,
                    image_bytes: vec![0, n as u8],
                    mime_type: "image/png".into(),
                    width: 1,
                    height: 1,
                })
                .collect())
        }
    }

    fn pipeline(pages: usize) -> (Pipeline, Arc<TableModel>, Arc<FakeRasterizer>) {
        let model = Arc::new(TableModel {
            calls: AtomicUsize::new(0),
        });
        let rasterizer = Arc::new(FakeRasterizer {
            pages,
            rendered: Mutex::new(Vec::new()),
        });
        let pipeline = Pipeline::new(
            Some(model.clone() as Arc<dyn LanguageModel>),
            rasterizer.clone() as Arc<dyn Rasterizer>,
        );
        (pipeline, model, rasterizer)
    }

    fn pdf() -> DocumentInput {
        DocumentInput::Pdf {
            bytes: b"%PDF-1.7".to_vec(),
        }
    }

    #[tokio::test]
    async fn converts_selected_pages_in_order() {
        let (pipeline, model, rasterizer) = pipeline(10);
        let config = ConversionConfig::default().with_overrides(&crate::config::ConversionOverrides {
            start: Some(3),
            end: Some(8),
            exclude: Some("5".into()),
            ..Default::default()
        });

        let out = pipeline
            .convert(pdf(), &config, &CancellationToken::new())
            .await
            .unwrap();

        // One render per page, in whatever order the units ran.
        let mut renders = rasterizer.rendered.lock().unwrap().clone();
        renders.sort();
        assert_eq!(renders, vec![vec![3], vec![4], vec![6], vec![7], vec![8]]);
        assert_eq!(model.calls.load(Ordering::SeqCst), 5);
        assert_eq!(
            out.pages.iter().map(|p| p.page_num).collect::<Vec<_>>(),
            vec![3, 4, 6, 7, 8]
        );
        // Page 3 renders as [0, 3] → "AAM=", the no-tables page.
        assert!(!out.markdown.contains("## Page 3"));
        assert!(out.markdown.starts_with("## Page 4\n\n| image | AAQ= |"));
        assert_eq!(out.usage, Usage::new(50, 25));
        assert_eq!(out.total_pages, 10);
    }

    #[tokio::test]
    async fn all_sentinel_pages_yield_document_sentinel() {
        let (pipeline, _, _) = pipeline(5);
        let config = ConversionConfig::builder()
            .pages(crate::pipeline::pages::PageSelection {
                include: "3".into(),
                ..Default::default()
            })
            .build()
            .unwrap();
        let out = pipeline
            .convert(pdf(), &config, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.markdown, NO_TABLES_IN_DOCUMENT);
    }

    #[tokio::test]
    async fn empty_selection_fails_before_any_model_call() {
        let (pipeline, model, _) = pipeline(4);
        let config = ConversionConfig::default().with_overrides(&crate::config::ConversionOverrides {
            exclude: Some("1-4".into()),
            ..Default::default()
        });
        let err = pipeline
            .convert(pdf(), &config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DatasheetError::NoPagesSelected { total_pages: 4 }));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_conversion_renders_nothing() {
        let (pipeline, model, rasterizer) = pipeline(6);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = pipeline
            .convert(pdf(), &ConversionConfig::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DatasheetError::Cancelled { .. }));
        assert!(rasterizer.rendered.lock().unwrap().is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_image_has_no_page_heading() {
        let (pipeline, _, rasterizer) = pipeline(0);
        let input = DocumentInput::Image {
            bytes: vec![7, 7, 7],
            mime_type: "image/jpeg".into(),
        };
        let out = pipeline
            .convert(input, &ConversionConfig::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.markdown, "| image | BwcH |\n| --- | --- |");
        assert_eq!(out.total_pages, 1);
        assert!(rasterizer.rendered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn convert_without_model_is_provider_error() {
        let rasterizer = Arc::new(FakeRasterizer {
            pages: 1,
            rendered: Mutex::new(Vec::new()),
        });
        let pipeline = Pipeline::new(None, rasterizer);
        let err = pipeline
            .convert(pdf(), &ConversionConfig::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DatasheetError::ProviderNotConfigured { .. }));
    }

    #[tokio::test]
    async fn extract_rejects_blank_markdown() {
        let (pipeline, _, _) = pipeline(0);
        let err = pipeline
            .extract(
                "  \n ",
                &FieldSchema::default_schema(),
                &AliasMap::new(),
                &ExtractionConfig::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DatasheetError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn extract_without_model_is_heuristic() {
        let rasterizer = Arc::new(FakeRasterizer {
            pages: 0,
            rendered: Mutex::new(Vec::new()),
        });
        let pipeline = Pipeline::new(None, rasterizer);
        let result = pipeline
            .extract(
                "| Model | SM.V1 |",
                &FieldSchema::default_schema(),
                &AliasMap::new(),
                &ExtractionConfig::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.source, ExtractionSource::Heuristic);
        assert_eq!(result.fields["pump model name"], "SM.V1");
    }
}
