//! Prompts for the two model calls: table transcription and field extraction.
//!
//! Every instruction string lives here so prompt changes touch one file and
//! tests can inspect the text without a model. The sentinels are part of the
//! protocol, not just wording: [`crate::pipeline::postprocess`] matches on
//! [`NO_TABLES_IN_IMAGE`] and emits [`NO_TABLES_IN_DOCUMENT`].

/// What the model must answer for a page without any table.
pub const NO_TABLES_IN_IMAGE: &str = "No tables detected in the image.";

/// Aggregate Markdown when no page produced a table.
pub const NO_TABLES_IN_DOCUMENT: &str = "No tables detected in the document.";

/// Default instruction sent with every page image.
///
/// Used when `ConversionConfig::system_prompt` is `None`.
pub const TABLE_EXTRACTION_PROMPT: &str = r#"You are a precise table transcription engine for engineering datasheets.

Follow these rules exactly:

1. Extract ONLY tabular content from the image. Output every table as a GitHub-flavored Markdown pipe table.
2. Reconstruct merged or spanning cells by repeating the value in each covered cell, or by adding a footnote below the table.
3. Preserve numbers, decimal separators, ranges and units exactly as printed. Never invent, round or convert data.
4. Separate multiple tables with a single blank line.
5. Output no prose, headings, explanations or code fences. Only the tables.
6. If the image contains no table, reply with exactly: No tables detected in the image."#;

/// Opening instruction of the field-extraction prompt.
pub const FIELD_EXTRACTION_PROMPT: &str = r#"You extract engineering values from Markdown tables transcribed from a datasheet (for example a pump specification sheet).

For each requested field, find the single value in the document that best answers it.
- Copy the value verbatim, including its unit.
- If the document does not contain the field, use an empty string.
- Never guess or compute values that are not printed in the document."#;

/// Heading placed before the per-field match/exclude hints.
pub const FIELD_HINTS_HEADING: &str = "Field hints:";

/// Heading placed before the markdown appended to the extraction prompt.
pub const MARKDOWN_HEADING: &str = "Document:";

/// Build the strict-JSON clause listing the exact keys to return.
pub fn strict_json_clause(fields: &[String]) -> String {
    let keys = serde_json::to_string(fields).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Return strict JSON only: a single object whose keys are exactly {keys} and whose values are all strings. \
No markdown fences, no comments, no extra keys."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_prompt_carries_the_sentinel_verbatim() {
        assert!(TABLE_EXTRACTION_PROMPT.ends_with(NO_TABLES_IN_IMAGE));
    }

    #[test]
    fn strict_json_clause_lists_keys_as_json() {
        let clause = strict_json_clause(&["rated flow".to_string(), "speed".to_string()]);
        assert!(clause.contains(r#"["rated flow","speed"]"#), "got: {clause}");
        assert!(clause.contains("strict JSON"));
    }

    #[test]
    fn strict_json_clause_escapes_quotes() {
        let clause = strict_json_clause(&["size \"A\"".to_string()]);
        assert!(clause.contains(r#"["size \"A\""]"#), "got: {clause}");
    }
}
