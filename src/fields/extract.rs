//! Structured field extraction: prompt the model for a JSON object, fall back
//! to the heuristic scanner, reconcile aliases, normalise.

use crate::config::ExtractionConfig;
use crate::fields::heuristic::heuristic_extract;
use crate::fields::json::{parse_model_json, ParsedJson};
use crate::fields::schema::{AliasMap, AliasTarget, FieldSchema};
use crate::model::{LanguageModel, ModelRequest};
use crate::output::{ExtractionResult, ExtractionSource, Usage};
use crate::pipeline::dispatch::guarded;
use crate::prompts::{
    strict_json_clause, FIELD_EXTRACTION_PROMPT, FIELD_HINTS_HEADING, MARKDOWN_HEADING,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cut `markdown` to at most `max_chars` characters.
pub fn truncate_markdown(markdown: &str, max_chars: usize) -> &str {
    match markdown.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &markdown[..byte_idx],
        None => markdown,
    }
}

/// Build the field-extraction prompt: instruction, per-field hints, alias
/// clause, strict-JSON clause, then the document.
pub fn build_extraction_prompt(schema: &FieldSchema, aliases: &AliasMap, markdown: &str) -> String {
    let mut prompt = String::from(FIELD_EXTRACTION_PROMPT);

    let hints: Vec<String> = schema
        .fields()
        .iter()
        .filter_map(|name| {
            let rule = schema.rule(name)?;
            let mut hint = format!("- \"{name}\": prefer values matching {}", quoted(&rule.match_terms));
            if !rule.exclude.is_empty() {
                hint.push_str(&format!("; exclude {}", quoted(&rule.exclude)));
            }
            Some(hint)
        })
        .collect();
    if !hints.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(FIELD_HINTS_HEADING);
        prompt.push('\n');
        prompt.push_str(&hints.join("\n"));
    }

    if !aliases.is_empty() {
        prompt.push_str("\n\nThe document or your draft may use legacy field names. Reconcile them:");
        for (old, target) in aliases {
            match target {
                AliasTarget::Rename(new) => {
                    prompt.push_str(&format!("\n- rename \"{old}\" to \"{new}\""));
                }
                AliasTarget::Deleted => {
                    prompt.push_str(&format!("\n- drop \"{old}\""));
                }
            }
        }
    }

    prompt.push_str("\n\n");
    prompt.push_str(&strict_json_clause(schema.fields()));
    prompt.push_str("\n\n");
    prompt.push_str(MARKDOWN_HEADING);
    prompt.push('\n');
    prompt.push_str(markdown);
    prompt
}

fn quoted(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rename or drop aliased keys.
///
/// Keys without an alias pass through first. A renamed key never overwrites
/// a target that already holds a non-empty value.
pub fn apply_aliases(raw: Map<String, Value>, aliases: &AliasMap) -> Map<String, Value> {
    if aliases.is_empty() {
        return raw;
    }

    let mut out = Map::with_capacity(raw.len());
    let mut aliased = Vec::new();

    for (key, value) in raw {
        match aliases.get(&key) {
            Some(target) => aliased.push((key, target, value)),
            None => {
                out.insert(key, value);
            }
        }
    }

    for (old, target, value) in aliased {
        match target {
            AliasTarget::Deleted => debug!("Alias drops '{}'", old),
            AliasTarget::Rename(new) => {
                let occupied = out.get(new).is_some_and(|v| !normalize_value(v).is_empty());
                if occupied {
                    debug!("Alias '{}' → '{}' skipped, target already set", old, new);
                } else {
                    out.insert(new.clone(), value);
                }
            }
        }
    }

    out
}

/// Render one JSON value as a field string.
///
/// Strings are trimmed, numbers and booleans printed, `null` is empty,
/// arrays of scalars are joined with `", "`, anything else becomes JSON text.
pub fn normalize_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) if items.iter().all(is_scalar) => items
            .iter()
            .map(normalize_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Exactly `fields` as keys, every value a string, missing ones `""`.
pub fn normalize_fields(raw: &Map<String, Value>, fields: &[String]) -> BTreeMap<String, String> {
    fields
        .iter()
        .map(|name| {
            let value = raw.get(name).map(normalize_value).unwrap_or_default();
            (name.clone(), value)
        })
        .collect()
}

/// Run the full extraction for one document. Never fails.
///
/// With a model, one guarded call is made; a failed call, an unparsable
/// answer, or an object with no non-empty requested field falls back to
/// [`heuristic_extract`]. The model's usage is reported either way.
pub async fn extract_fields(
    model: Option<&dyn LanguageModel>,
    markdown: &str,
    schema: &FieldSchema,
    aliases: &AliasMap,
    config: &ExtractionConfig,
    cancel: &CancellationToken,
) -> ExtractionResult {
    let markdown = truncate_markdown(markdown, config.max_markdown_chars);
    let fields = schema.fields().to_vec();
    let mut usage = Usage::default();

    if let Some(model) = model {
        match model_fields(model, markdown, schema, aliases, config, cancel).await {
            Ok((raw, call_usage)) => {
                usage = call_usage;
                if let Some(raw) = raw {
                    let aliased = apply_aliases(raw, aliases);
                    let normalized = normalize_fields(&aliased, &fields);
                    if normalized.values().any(|v| !v.is_empty()) {
                        info!("Extracted {} fields with {}", fields.len(), model.name());
                        return ExtractionResult {
                            fields: normalized,
                            order: fields,
                            usage,
                            source: ExtractionSource::Model,
                        };
                    }
                    warn!("Model answer had no usable field values, using heuristic extractor");
                } else {
                    warn!("Model answer was not a JSON object, using heuristic extractor");
                }
            }
            Err(e) => warn!("Field extraction call failed ({}), using heuristic extractor", e),
        }
    } else {
        debug!("No model configured, using heuristic extractor");
    }

    let raw: Map<String, Value> = heuristic_extract(markdown, schema)
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    let aliased = apply_aliases(raw, aliases);

    ExtractionResult {
        fields: normalize_fields(&aliased, &fields),
        order: fields,
        usage,
        source: ExtractionSource::Heuristic,
    }
}

async fn model_fields(
    model: &dyn LanguageModel,
    markdown: &str,
    schema: &FieldSchema,
    aliases: &AliasMap,
    config: &ExtractionConfig,
    cancel: &CancellationToken,
) -> Result<(Option<Map<String, Value>>, Usage), crate::error::DatasheetError> {
    let request = ModelRequest {
        system: None,
        prompt: build_extraction_prompt(schema, aliases, markdown),
        images: Vec::new(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };

    let response = guarded(
        model.complete(request),
        Duration::from_secs(config.api_timeout_secs),
        cancel,
        "field extraction call",
    )
    .await?;

    let parsed = match parse_model_json(&response.content) {
        ParsedJson::Parsed(map) if !map.is_empty() => Some(map),
        _ => None,
    };
    Ok((parsed, response.usage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatasheetError;
    use crate::fields::schema::MatchRule;
    use crate::model::ModelResponse;
    use async_trait::async_trait;
    use serde_json::json;

    struct Scripted(Result<&'static str, &'static str>);

    #[async_trait]
    impl LanguageModel for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, DatasheetError> {
            assert!(request.images.is_empty());
            match self.0 {
                Ok(content) => Ok(ModelResponse {
                    content: content.to_string(),
                    usage: Usage::new(300, 40),
                }),
                Err(message) => Err(DatasheetError::LlmApiError {
                    message: message.to_string(),
                }),
            }
        }
    }

    /// Never answers within any sane timeout.
    struct Stalled;

    #[async_trait]
    impl LanguageModel for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _request: ModelRequest) -> Result<ModelResponse, DatasheetError> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(ModelResponse {
                content: r#"{"pump model name": "late"}"#.to_string(),
                usage: Usage::new(1, 1),
            })
        }
    }

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_markdown("m³/h flow", 4), "m³/h");
        assert_eq!(truncate_markdown("short", 100), "short");
        assert_eq!(truncate_markdown("abc", 0), "");
    }

    #[test]
    fn prompt_contains_hints_aliases_keys_and_document() {
        let schema = FieldSchema::for_fields(&["rated head", "seal type"]);
        let aliases = AliasMap::from([
            ("head".to_string(), AliasTarget::Rename("rated head".into())),
            ("notes".to_string(), AliasTarget::Deleted),
        ]);
        let prompt = build_extraction_prompt(&schema, &aliases, "| Head | 32 m |");

        assert!(prompt.starts_with(FIELD_EXTRACTION_PROMPT));
        assert!(prompt.contains(r#"- "rated head": prefer values matching "rated head""#));
        assert!(prompt.contains(r#"exclude "shutoff", "shut-off", "npsh""#));
        assert!(!prompt.contains(r#"- "seal type""#));
        assert!(prompt.contains(r#"rename "head" to "rated head""#));
        assert!(prompt.contains(r#"drop "notes""#));
        assert!(prompt.contains(r#"["rated head","seal type"]"#));
        assert!(prompt.ends_with("Document:\n| Head | 32 m |"));
    }

    #[test]
    fn prompt_without_aliases_has_no_alias_clause() {
        let prompt = build_extraction_prompt(&FieldSchema::default_schema(), &AliasMap::new(), "x");
        assert!(!prompt.contains("legacy field names"));
    }

    #[test]
    fn aliases_rename_and_delete() {
        let aliases = AliasMap::from([
            ("head".to_string(), AliasTarget::Rename("rated head".into())),
            ("notes".to_string(), AliasTarget::Deleted),
        ]);
        let out = apply_aliases(obj(json!({"head": "32 m", "notes": "x", "speed": "2900"})), &aliases);
        assert_eq!(out, obj(json!({"rated head": "32 m", "speed": "2900"})));
    }

    #[test]
    fn alias_never_overwrites_a_filled_target() {
        let aliases = AliasMap::from([("head".to_string(), AliasTarget::Rename("rated head".into()))]);
        let out = apply_aliases(obj(json!({"rated head": "30 m", "head": "32 m"})), &aliases);
        assert_eq!(out["rated head"], json!("30 m"));

        let out = apply_aliases(obj(json!({"rated head": "", "head": "32 m"})), &aliases);
        assert_eq!(out["rated head"], json!("32 m"));
    }

    #[test]
    fn normalization_coerces_and_fills() {
        let fields: Vec<String> = ["a", "b", "c", "d", "e", "f", "g"].map(String::from).to_vec();
        let raw = obj(json!({
            "a": " 50 m ", "b": 2900, "c": true, "d": null,
            "e": ["316", "SS", 4], "f": {"min": 1}, "extra": "dropped"
        }));
        let out = normalize_fields(&raw, &fields);
        assert_eq!(out["a"], "50 m");
        assert_eq!(out["b"], "2900");
        assert_eq!(out["c"], "true");
        assert_eq!(out["d"], "");
        assert_eq!(out["e"], "316, SS, 4");
        assert_eq!(out["f"], r#"{"min":1}"#);
        assert_eq!(out["g"], "");
        assert!(!out.contains_key("extra"));
    }

    #[test]
    fn normalization_is_idempotent() {
        let fields: Vec<String> = ["a", "b", "c"].map(String::from).to_vec();
        let once = normalize_fields(&obj(json!({"a": [1, 2], "b": 3.5, "c": null})), &fields);
        let as_json: Map<String, Value> = once
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        assert_eq!(normalize_fields(&as_json, &fields), once);
    }

    #[tokio::test]
    async fn model_answer_is_used_when_usable() {
        let model = Scripted(Ok("```json\n{\"rated flow\": \"50 m3/h\", \"speed\": 2900}\n```"));
        let schema = FieldSchema::for_fields(&["rated flow", "speed", "npshr"]);
        let result = extract_fields(
            Some(&model),
            "| Flow | 50 m3/h |",
            &schema,
            &AliasMap::new(),
            &ExtractionConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.source, ExtractionSource::Model);
        assert_eq!(result.fields["rated flow"], "50 m3/h");
        assert_eq!(result.fields["speed"], "2900");
        assert_eq!(result.fields["npshr"], "");
        assert_eq!(result.usage, Usage::new(300, 40));
        assert_eq!(result.order, schema.fields());
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_heuristic() {
        let model = Scripted(Err("HTTP 503"));
        let result = extract_fields(
            Some(&model),
            "| Model | SM.V1 |",
            &FieldSchema::default_schema(),
            &AliasMap::new(),
            &ExtractionConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.source, ExtractionSource::Heuristic);
        assert_eq!(result.fields["pump model name"], "SM.V1");
        assert_eq!(result.fields.len(), 13);
        assert_eq!(result.usage, Usage::default());
    }

    #[tokio::test]
    async fn empty_or_garbage_answer_falls_back_but_keeps_usage() {
        for answer in ["{}", "I could not find anything.", r#"{"rated flow": ""}"#] {
            let model = Scripted(Ok(answer));
            let result = extract_fields(
                Some(&model),
                "Rated flow: 12 l/s",
                &FieldSchema::for_fields(&["rated flow"]),
                &AliasMap::new(),
                &ExtractionConfig::default(),
                &CancellationToken::new(),
            )
            .await;
            assert_eq!(result.source, ExtractionSource::Heuristic, "answer: {answer}");
            assert_eq!(result.fields["rated flow"], "12 l/s");
            assert_eq!(result.usage, Usage::new(300, 40));
        }
    }

    #[tokio::test]
    async fn model_aliases_are_reconciled() {
        let model = Scripted(Ok(r#"{"shutoff": "41 m", "legacy": "x"}"#));
        let schema = FieldSchema::for_fields(&["shutoff head"]);
        let aliases = AliasMap::from([
            ("shutoff".to_string(), AliasTarget::Rename("shutoff head".into())),
            ("legacy".to_string(), AliasTarget::Deleted),
        ]);
        let result = extract_fields(
            Some(&model),
            "irrelevant",
            &schema,
            &aliases,
            &ExtractionConfig::default(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.source, ExtractionSource::Model);
        assert_eq!(result.fields.len(), 1);
        assert_eq!(result.fields["shutoff head"], "41 m");
    }

    #[tokio::test]
    async fn no_model_uses_heuristic_with_custom_rule() {
        let schema = FieldSchema::for_fields(&["speed"])
            .with_rule("shutoffTDH", MatchRule::new(&["shutoff tdh"], &["tdh"]));
        let result = extract_fields(
            None,
            "Shutoff TDH: 15.5 m",
            &schema,
            &AliasMap::new(),
            &ExtractionConfig::default(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.fields["shutoffTDH"], "15.5 m");
        assert_eq!(result.fields["speed"], "");
    }

    #[tokio::test]
    async fn markdown_is_truncated_before_extraction() {
        let config = ExtractionConfig {
            max_markdown_chars: 10,
            ..ExtractionConfig::default()
        };
        let result = extract_fields(
            None,
            "padding...\nManufacturer: Acme",
            &FieldSchema::for_fields(&["manufacturer"]),
            &AliasMap::new(),
            &config,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.fields["manufacturer"], "");
    }

    #[tokio::test]
    async fn timed_out_call_falls_back_to_heuristic() {
        let config = ExtractionConfig {
            api_timeout_secs: 1,
            ..ExtractionConfig::default()
        };
        let started = std::time::Instant::now();
        let result = extract_fields(
            Some(&Stalled),
            "| Model | SM.V1 |",
            &FieldSchema::default_schema(),
            &AliasMap::new(),
            &config,
            &CancellationToken::new(),
        )
        .await;
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        assert_eq!(result.source, ExtractionSource::Heuristic);
        assert_eq!(result.fields["pump model name"], "SM.V1");
        assert_eq!(result.usage, Usage::default());
    }

    #[tokio::test]
    async fn cancelled_call_falls_back_to_heuristic() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let model = Scripted(Ok(r#"{"pump model name": "from model"}"#));
        let result = extract_fields(
            Some(&model),
            "| Model | SM.V1 |",
            &FieldSchema::default_schema(),
            &AliasMap::new(),
            &ExtractionConfig::default(),
            &cancel,
        )
        .await;
        assert_eq!(result.source, ExtractionSource::Heuristic);
        assert_eq!(result.fields["pump model name"], "SM.V1");
        assert_eq!(result.usage, Usage::default());
    }
}
