//! Lenient parsing of the model's JSON answer.

use serde_json::{Map, Value};
use tracing::debug;

/// Outcome of [`parse_model_json`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedJson {
    Parsed(Map<String, Value>),
    Unparsable,
}

/// Parse a JSON object out of a model response.
///
/// Tries the whole trimmed text first, then the span from the first `{` to
/// the last `}` (which strips code fences and chatter around the object).
/// Anything that is not a JSON object is [`ParsedJson::Unparsable`].
pub fn parse_model_json(text: &str) -> ParsedJson {
    let trimmed = text.trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return ParsedJson::Parsed(map);
    }

    if let (Some(open), Some(close)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if open < close {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&trimmed[open..=close]) {
                debug!("Salvaged JSON object from {} chars of model output", trimmed.len());
                return ParsedJson::Parsed(map);
            }
        }
    }

    ParsedJson::Unparsable
}
