//! Configuration types for table conversion and field extraction.
//!
//! Conversion behaviour is controlled through [`ConversionConfig`], built via
//! [`ConversionConfigBuilder`]. The process-wide defaults come from the CLI
//! (flags and `DATASHEET_*` env vars); each HTTP request may then narrow them
//! with a [`ConversionOverrides`] taken from its query string.
//!
//! Every numeric knob is clamped rather than rejected: a request asking for
//! `concurrency=12` gets 5, `scale=0.5` gets 1.0. Only `build()` rejects
//! values, and only for configurations assembled by hand.

use crate::error::DatasheetError;
use crate::pipeline::pages::PageSelection;
use serde::{Deserialize, Serialize};

/// Upper bound on pages converted per request.
pub const MAX_PAGES_CAP: usize = 50;
/// Smallest accepted render scale.
pub const MIN_SCALE: f32 = 1.0;
/// Largest accepted render scale.
pub const MAX_SCALE: f32 = 4.0;
/// Largest accepted number of concurrent vision calls.
pub const MAX_CONCURRENCY: usize = 5;
/// Default character ceiling for markdown sent to field extraction.
pub const DEFAULT_MAX_MARKDOWN_CHARS: usize = 20_000;

/// Configuration for a document-to-Markdown conversion.
///
/// # Example
/// ```rust
/// use edgequake_datasheet::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .scale(2.0)
///     .concurrency(3)
///     .max_pages(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Render scale relative to the PDF's 72 DPI user space. Range 1–4. Default: 2.0.
    ///
    /// 2.0 (144 DPI) keeps table gridlines and small digits legible for the
    /// model; 3–4 helps with dense datasheets at the cost of larger uploads.
    pub scale: f32,

    /// Concurrent vision calls per request. Range 1–5. Default: 3.
    pub concurrency: usize,

    /// Cap on the number of pages taken from `pages.start`. Range 1–50. Default: none.
    pub max_pages: Option<usize>,

    /// Which pages of a paginated document to convert.
    pub pages: PageSelection,

    /// Sampling temperature for table transcription. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Per-vision-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom table-extraction instruction. If None, uses the built-in one.
    pub system_prompt: Option<String>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            scale: 2.0,
            concurrency: 3,
            max_pages: None,
            pages: PageSelection::default(),
            temperature: 0.0,
            max_tokens: 4096,
            api_timeout_secs: 60,
            system_prompt: None,
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Return a copy of this configuration narrowed by per-request overrides.
    ///
    /// Unset override fields keep the configured default. Every value passes
    /// through the same clamping as the builder setters.
    pub fn with_overrides(&self, overrides: &ConversionOverrides) -> ConversionConfig {
        let mut builder = ConversionConfigBuilder {
            config: self.clone(),
        };
        if let Some(n) = overrides.max_pages {
            builder = builder.max_pages(n);
        }
        if let Some(s) = overrides.scale {
            builder = builder.scale(s);
        }
        if let Some(c) = overrides.concurrency {
            builder = builder.concurrency(c);
        }
        if let Some(start) = overrides.start {
            builder.config.pages.start = start.max(1);
        }
        if overrides.end.is_some() {
            builder.config.pages.end = overrides.end;
        }
        if let Some(ref spec) = overrides.pages {
            builder.config.pages.include = spec.clone();
        }
        if let Some(ref spec) = overrides.exclude {
            builder.config.pages.exclude = spec.clone();
        }
        builder.config
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = if scale.is_finite() {
            scale.clamp(MIN_SCALE, MAX_SCALE)
        } else {
            MIN_SCALE
        };
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.clamp(1, MAX_CONCURRENCY);
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = Some(n.clamp(1, MAX_PAGES_CAP));
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, DatasheetError> {
        let c = &self.config;
        if !(MIN_SCALE..=MAX_SCALE).contains(&c.scale) {
            return Err(DatasheetError::InvalidConfig(format!(
                "scale must be {MIN_SCALE}–{MAX_SCALE}, got {}",
                c.scale
            )));
        }
        if c.concurrency == 0 || c.concurrency > MAX_CONCURRENCY {
            return Err(DatasheetError::InvalidConfig(format!(
                "concurrency must be 1–{MAX_CONCURRENCY}, got {}",
                c.concurrency
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(DatasheetError::InvalidConfig(
                "api timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Per-request narrowing of a [`ConversionConfig`].
///
/// Mirrors the Convert endpoint's query string; the CLI fills it from flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOverrides {
    pub max_pages: Option<usize>,
    pub scale: Option<f32>,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub concurrency: Option<usize>,
    pub pages: Option<String>,
    pub exclude: Option<String>,
}

/// Configuration for structured field extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Markdown beyond this many characters is cut off before extraction. Default: 20 000.
    pub max_markdown_chars: usize,

    /// Sampling temperature for the extraction call. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 1024.
    pub max_tokens: usize,

    /// Timeout for the extraction call in seconds. Default: 60.
    ///
    /// A timed-out call falls back to the heuristic extractor.
    pub api_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_markdown_chars: DEFAULT_MAX_MARKDOWN_CHARS,
            temperature: 0.0,
            max_tokens: 1024,
            api_timeout_secs: 60,
        }
    }
}
