//! Deterministic field extraction used when the model path yields nothing.
//!
//! Each field's match terms become one case-insensitive alternation. The
//! markdown is scanned top to bottom; a candidate is either a pipe-table row
//! whose first cell names the field (value: second cell) or a
//! `key <sep> value` line with `sep` one of `| : = -`.
//!
//! The first candidate with a non-empty value is final. Its value is dropped
//! to `""` when it contains one of the field's exclude terms and none of its
//! match terms; a match term in the value always wins over an exclude term.

use crate::fields::schema::{FieldSchema, MatchRule};
use crate::pipeline::postprocess::{is_separator_row, is_table_row};
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Extract every schema field from `markdown`. Missing fields map to `""`.
pub fn heuristic_extract(markdown: &str, schema: &FieldSchema) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    for name in schema.fields() {
        let value = match FieldMatcher::new(name, schema) {
            Some(matcher) => matcher.find(markdown).unwrap_or_default(),
            None => String::new(),
        };
        if !value.is_empty() {
            debug!("Heuristic match for '{}': {}", name, value);
        }
        fields.insert(name.clone(), value);
    }

    fields
}

struct FieldMatcher<'a> {
    terms: Regex,
    key_value: Regex,
    rule: Option<&'a MatchRule>,
}

impl<'a> FieldMatcher<'a> {
    fn new(name: &str, schema: &'a FieldSchema) -> Option<Self> {
        let alternation = term_alternation(&schema.match_terms(name))?;
        let terms = Regex::new(&format!("(?i){alternation}"));
        let key_value = Regex::new(&format!(
            r"(?i)^\s*(?:[-*+]\s+)?(?P<key>[^:=|]*?(?:{alternation})[^:=|]*?)\s*[:=|\-]\s*(?P<value>.+?)\s*$"
        ));

        match (terms, key_value) {
            (Ok(terms), Ok(key_value)) => Some(Self {
                terms,
                key_value,
                rule: schema.rule(name),
            }),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Cannot build matcher for field '{}': {}", name, e);
                None
            }
        }
    }

    fn find(&self, markdown: &str) -> Option<String> {
        let (key, value) = markdown
            .lines()
            .filter_map(|line| self.candidate(line))
            .find(|(_, value)| !value.is_empty())?;

        if self.is_excluded(&value) {
            debug!("Value '{}' for '{}' rejected by exclude rule", value, key);
            return None;
        }
        Some(value)
    }

    /// The `(label, value)` pair this line offers for the field, if any.
    fn candidate(&self, line: &str) -> Option<(String, String)> {
        let trimmed = line.trim();

        if trimmed.starts_with('|') {
            if !is_table_row(trimmed) || is_separator_row(trimmed) {
                return None;
            }
            let inner = trimmed.trim_start_matches('|').trim_end_matches('|');
            let mut cells = inner.split('|').map(clean_value);
            let key = cells.next()?;
            if !self.terms.is_match(&key) {
                return None;
            }
            let value = cells.next().unwrap_or_default();
            return Some((key, value));
        }

        let caps = self.key_value.captures(trimmed)?;
        Some((
            clean_value(&caps["key"]),
            clean_value(&caps["value"]),
        ))
    }

    /// True when `value` contains an exclude term and no match term.
    fn is_excluded(&self, value: &str) -> bool {
        let Some(rule) = self.rule else {
            return false;
        };
        if self.terms.is_match(value) {
            return false;
        }

        let value = value.to_lowercase();
        rule.exclude
            .iter()
            .map(|term| term.trim().to_lowercase())
            .any(|term| !term.is_empty() && value.contains(&term))
    }
}

/// Escaped, longest-first alternation of `terms`, with word boundaries on
/// ends that are word characters.
fn term_alternation(terms: &[String]) -> Option<String> {
    let mut terms: Vec<&str> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        return None;
    }
    terms.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));

    let parts: Vec<String> = terms
        .iter()
        .map(|term| {
            let starts_word = term.chars().next().is_some_and(is_word_char);
            let ends_word = term.chars().last().is_some_and(is_word_char);
            format!(
                "{}{}{}",
                if starts_word { r"\b" } else { "" },
                regex::escape(term),
                if ends_word { r"\b" } else { "" }
            )
        })
        .collect();

    Some(format!("(?:{})", parts.join("|")))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn clean_value(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c == '|' || c == '*' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(markdown: &str, schema: &FieldSchema) -> BTreeMap<String, String> {
        heuristic_extract(markdown, schema)
    }

    #[test]
    fn table_row_first_cell_to_second_cell() {
        let out = extract("| Model | SM.V1 |", &FieldSchema::default_schema());
        assert_eq!(out["pump model name"], "SM.V1");
        for (name, value) in &out {
            if name != "pump model name" {
                assert_eq!(value, "", "field {name} should be empty");
            }
        }
        assert_eq!(out.len(), 13);
    }

    #[test]
    fn key_value_lines_with_each_separator() {
        let schema = FieldSchema::for_fields(&["rated flow", "speed", "manufacturer", "specific gravity"]);
        let md = "Rated flow: 50 m³/h\n- Speed = 2900 rpm\nManufacturer - Acme Pumps\n**SG** | 1.02";
        let out = extract(md, &schema);
        assert_eq!(out["rated flow"], "50 m³/h");
        assert_eq!(out["speed"], "2900 rpm");
        assert_eq!(out["manufacturer"], "Acme Pumps");
        assert_eq!(out["specific gravity"], "1.02");
    }

    #[test]
    fn match_term_covering_exclude_term_wins() {
        let schema = FieldSchema::for_fields::<&str>(&[])
            .with_rule("shutoffTDH", MatchRule::new(&["shutoff tdh"], &["tdh"]));
        let out = extract("Shutoff TDH: 15.5 m", &schema);
        assert_eq!(out["shutoffTDH"], "15.5 m");
    }

    #[test]
    fn label_exclude_term_does_not_drop_the_value() {
        let schema = FieldSchema::default_schema();
        let md = "| Shutoff head | 41 m |\n| Rated head | 32 m |\n| Specific speed | 28 |\n| Speed | 2950 rpm |";
        let out = extract(md, &schema);
        // "head" and "speed" are the fields' own match terms, so the first rows stand.
        assert_eq!(out["rated head"], "41 m");
        assert_eq!(out["shutoff head"], "41 m");
        assert_eq!(out["speed"], "28");
    }

    #[test]
    fn match_and_exclude_term_on_one_line_keeps_the_value() {
        let schema = FieldSchema::for_fields(&["rated head"]);
        let out = extract("Rated head: 41 m at shutoff head", &schema);
        assert_eq!(out["rated head"], "41 m at shutoff head");
    }

    #[test]
    fn unexcluded_rows_are_taken() {
        let schema = FieldSchema::default_schema();
        let md = "| Rated head | 32 m |\n| Flow | 50 m³/h |\n| Shutoff head | 41 m |\n| Min. flow | 10 m³/h |";
        let out = extract(md, &schema);
        assert_eq!(out["rated head"], "32 m");
        assert_eq!(out["rated flow"], "50 m³/h");
        assert_eq!(out["shutoff head"], "41 m");
    }

    #[test]
    fn excluded_value_is_dropped() {
        let schema = FieldSchema::for_fields(&["pump efficiency"]);
        let out = extract("Pump efficiency: see motor datasheet", &schema);
        assert_eq!(out["pump efficiency"], "");

        let out = extract("Motor efficiency: 95 %", &schema);
        assert_eq!(out["pump efficiency"], "95 %");
    }

    #[test]
    fn first_match_top_to_bottom_wins() {
        let schema = FieldSchema::for_fields(&["manufacturer"]);
        let out = extract("Manufacturer: First\nManufacturer: Second", &schema);
        assert_eq!(out["manufacturer"], "First");
    }

    #[test]
    fn unknown_field_matches_its_literal_name() {
        let schema = FieldSchema::for_fields(&["Seal type"]);
        let out = extract("| seal TYPE | Mechanical |", &schema);
        assert_eq!(out["Seal type"], "Mechanical");
    }

    #[test]
    fn separator_rows_and_empty_values_are_ignored() {
        let schema = FieldSchema::for_fields(&["manufacturer"]);
        let md = "| Manufacturer |  |\n| --- | --- |\n| Make | Grundfos |";
        let out = extract(md, &schema);
        assert_eq!(out["manufacturer"], "Grundfos");
    }

    #[test]
    fn terms_respect_word_boundaries() {
        let schema = FieldSchema::for_fields(&["rated head"]);
        let out = extract("Headquarters: Oslo", &schema);
        assert_eq!(out["rated head"], "");
    }

    #[test]
    fn alternation_is_longest_first_and_escaped() {
        let alt = term_alternation(&["eff.".to_string(), "pump efficiency".to_string()]).unwrap();
        assert_eq!(alt, r"(?:\bpump efficiency\b|\beff\.)");
        assert!(term_alternation(&[" ".to_string()]).is_none());
    }
}
