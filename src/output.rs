//! Result types returned by conversion and extraction, plus usage metering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Token usage reported by the model, in the wire format both endpoints return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    /// Usage for one call. `total_tokens` is derived, never trusted from the provider.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Request-scoped usage counter shared by every in-flight page call.
///
/// Increments are atomic adds, so concurrent page tasks may record without
/// a lock. Read it with [`UsageAccumulator::snapshot`] once the batch is done.
#[derive(Debug, Default)]
pub struct UsageAccumulator {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    total_tokens: AtomicU64,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, usage: Usage) {
        self.prompt_tokens
            .fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(usage.completion_tokens, Ordering::Relaxed);
        self.total_tokens
            .fetch_add(usage.total_tokens, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
        }
    }
}

/// The model's answer for one page, before aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMarkdown {
    /// 1-indexed page number (always 1 for single images).
    pub page_num: usize,
    pub markdown: String,
    pub usage: Usage,
    pub duration_ms: u64,
}

/// Output of a full conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Aggregated Markdown, or the "no tables" document sentinel.
    pub markdown: String,
    pub usage: Usage,
    /// Raw per-page answers in page order.
    pub pages: Vec<PageMarkdown>,
    /// Pages in the source (1 for images).
    pub total_pages: usize,
    pub duration_ms: u64,
}

/// Which path produced an [`ExtractionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    Model,
    Heuristic,
}

/// Normalised field map for one document.
///
/// `fields` always holds exactly the names in `order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub fields: BTreeMap<String, String>,
    pub order: Vec<String>,
    pub usage: Usage,
    pub source: ExtractionSource,
}

impl ExtractionResult {
    /// Field values in requested order.
    pub fn ordered(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.order.iter().map(move |name| {
            let value = self.fields.get(name).map(String::as_str).unwrap_or("");
            (name.as_str(), value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn usage_total_is_derived() {
        assert_eq!(Usage::new(120, 30).total_tokens, 150);
    }

    #[test]
    fn usage_serialises_with_snake_case_keys() {
        let json = serde_json::to_value(Usage::new(1, 2)).unwrap();
        assert_eq!(json["prompt_tokens"], 1);
        assert_eq!(json["completion_tokens"], 2);
        assert_eq!(json["total_tokens"], 3);
    }

    #[tokio::test]
    async fn accumulator_sums_concurrent_records() {
        let acc = Arc::new(UsageAccumulator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let acc = Arc::clone(&acc);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    acc.record(Usage::new(2, 1));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(acc.snapshot(), Usage::new(1600, 800));
    }

    #[test]
    fn ordered_follows_requested_order() {
        let result = ExtractionResult {
            fields: BTreeMap::from([
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
            ]),
            order: vec!["b".into(), "a".into()],
            usage: Usage::default(),
            source: ExtractionSource::Heuristic,
        };
        let pairs: Vec<_> = result.ordered().collect();
        assert_eq!(pairs, vec![("b", "2"), ("a", "1")]);
    }
}
