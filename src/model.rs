//! Model access: the [`LanguageModel`] seam and its edgequake-llm adapter.
//!
//! The pipeline only ever talks to `dyn LanguageModel`, so tests drive it with
//! scripted responses and the server holds one shared client for both
//! endpoints. [`EdgequakeModel`] wraps any [`LLMProvider`] built by
//! [`resolve_provider`].

use crate::error::DatasheetError;
use crate::output::Usage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::{debug, info};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// An image attached to a [`ModelRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    /// Base64 payload, no `data:` prefix.
    pub data: String,
    pub mime_type: String,
}

/// One chat completion: optional system text, a user turn, optional images.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub images: Vec<ImageAttachment>,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// The model's text answer plus what it cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub content: String,
    pub usage: Usage,
}

/// A chat model that can read images.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider/model label for logs.
    fn name(&self) -> &str;

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, DatasheetError>;
}

/// [`LanguageModel`] backed by an edgequake-llm provider.
pub struct EdgequakeModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl EdgequakeModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

impl std::fmt::Debug for EdgequakeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgequakeModel")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LanguageModel for EdgequakeModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, DatasheetError> {
        let messages = build_messages(&request);
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| DatasheetError::LlmApiError {
                message: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );

        Ok(ModelResponse {
            content: response.content,
            usage: Usage::new(
                response.prompt_tokens as u64,
                response.completion_tokens as u64,
            ),
        })
    }
}

/// System turn first (when present), then one user turn carrying the images.
fn build_messages(request: &ModelRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(ref system) = request.system {
        messages.push(ChatMessage::system(system.as_str()));
    }
    let images: Vec<ImageData> = request
        .images
        .iter()
        .map(|img| ImageData::new(img.data.clone(), img.mime_type.clone()).with_detail("high"))
        .collect();
    messages.push(ChatMessage::user_with_images(request.prompt.as_str(), images));
    messages
}

fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, DatasheetError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DatasheetError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the model client, from most-specific to least-specific.
///
/// 1. `provider_name` (+ `model`, default [`DEFAULT_MODEL`]).
/// 2. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 3. OpenAI, when `OPENAI_API_KEY` is set.
/// 4. Whatever `ProviderFactory::from_env` detects.
pub fn resolve_provider(
    provider_name: Option<&str>,
    model: Option<&str>,
) -> Result<EdgequakeModel, DatasheetError> {
    if let Some(name) = provider_name {
        let model = model.unwrap_or(DEFAULT_MODEL);
        info!("Using provider {name} with model {model}");
        return Ok(EdgequakeModel::new(
            create_provider(name, model)?,
            format!("{name}/{model}"),
        ));
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            info!("Using provider {prov} with model {env_model} from environment");
            return Ok(EdgequakeModel::new(
                create_provider(&prov, &env_model)?,
                format!("{prov}/{env_model}"),
            ));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = model.unwrap_or(DEFAULT_MODEL);
            return Ok(EdgequakeModel::new(
                create_provider("openai", model)?,
                format!("openai/{model}"),
            ));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DatasheetError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(EdgequakeModel::new(llm_provider, "auto"))
}
