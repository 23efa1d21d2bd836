//! Vision call: send one page image with the table instruction, get Markdown back.
//!
//! Thin on purpose. The instruction text lives in [`crate::prompts`], the
//! deadline and cancellation in [`crate::pipeline::dispatch::guarded`]. There
//! is no retry: a failed page fails the conversion.

use crate::config::ConversionConfig;
use crate::error::DatasheetError;
use crate::model::{LanguageModel, ModelRequest};
use crate::output::{PageMarkdown, UsageAccumulator};
use crate::pipeline::dispatch::guarded;
use crate::pipeline::encode;
use crate::pipeline::postprocess;
use crate::pipeline::render::RenderedPage;
use crate::prompts::TABLE_EXTRACTION_PROMPT;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Convert one rendered page into cleaned Markdown.
///
/// The request carries the table instruction as the system turn and the
/// page image in an otherwise empty user turn. On success the call's usage
/// is added to `usage`.
///
/// # Errors
/// [`DatasheetError::PageFailed`] when the model call fails, and
/// `Timeout` / `Cancelled` from the guard unchanged.
pub async fn process_page(
    model: &dyn LanguageModel,
    page: RenderedPage,
    config: &ConversionConfig,
    usage: &UsageAccumulator,
    cancel: &CancellationToken,
) -> Result<PageMarkdown, DatasheetError> {
    let start = Instant::now();
    let page_num = page.page_number;

    let request = build_request(&page, config);
    drop(page);

    let context = format!("page {page_num} vision call");
    let response = guarded(
        model.complete(request),
        Duration::from_secs(config.api_timeout_secs),
        cancel,
        &context,
    )
    .await
    .map_err(|e| match e {
        DatasheetError::Timeout { .. } | DatasheetError::Cancelled { .. } => e,
        other => DatasheetError::PageFailed {
            page: page_num,
            detail: other.to_string(),
        },
    })?;

    usage.record(response.usage);
    let duration = start.elapsed();
    debug!(
        "Page {}: {} input tokens, {} output tokens, {:?}",
        page_num, response.usage.prompt_tokens, response.usage.completion_tokens, duration
    );

    Ok(PageMarkdown {
        page_num,
        markdown: postprocess::clean_page(&response.content),
        usage: response.usage,
        duration_ms: duration.as_millis() as u64,
    })
}

fn build_request(page: &RenderedPage, config: &ConversionConfig) -> ModelRequest {
    let system = config
        .system_prompt
        .as_deref()
        .unwrap_or(TABLE_EXTRACTION_PROMPT);

    ModelRequest {
        system: Some(system.to_string()),
        prompt: String::new(),
        images: vec![encode::to_attachment(&page.image_bytes, &page.mime_type)],
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}
