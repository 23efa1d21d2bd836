//! Field schema: the ordered field names to extract and the synonym rules
//! used to find them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Synonyms that identify a field, and terms that disqualify a candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    #[serde(rename = "match", default)]
    pub match_terms: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl MatchRule {
    pub fn new(match_terms: &[&str], exclude: &[&str]) -> Self {
        Self {
            match_terms: match_terms.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// What an alias does with the old field name.
///
/// In JSON, a string renames and `null` (or a blank string) deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum AliasTarget {
    Rename(String),
    Deleted,
}

impl From<Option<String>> for AliasTarget {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(name) if !name.trim().is_empty() => AliasTarget::Rename(name.trim().to_string()),
            _ => AliasTarget::Deleted,
        }
    }
}

impl From<AliasTarget> for Option<String> {
    fn from(value: AliasTarget) -> Self {
        match value {
            AliasTarget::Rename(name) => Some(name),
            AliasTarget::Deleted => None,
        }
    }
}

/// Old field name → what to do with it.
pub type AliasMap = BTreeMap<String, AliasTarget>;

/// Ordered, unique field names, each optionally carrying a [`MatchRule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    fields: Vec<String>,
    rules: HashMap<String, MatchRule>,
}

/// The built-in pump-datasheet vocabulary, in display order.
const DEFAULT_FIELDS: &[(&str, &[&str], &[&str])] = &[
    (
        "pump model name",
        &["pump model name", "pump model", "model name", "model", "type designation"],
        &[],
    ),
    (
        "manufacturer",
        &["manufacturer", "make", "brand", "supplier"],
        &[],
    ),
    (
        "rated flow",
        &["rated flow", "rated capacity", "flow rate", "capacity", "flow"],
        &["minimum", "min."],
    ),
    (
        "rated head",
        &["rated head", "rated tdh", "total dynamic head", "total head", "head", "tdh"],
        &["shutoff", "shut-off", "npsh"],
    ),
    (
        "shutoff head",
        &["shutoff head", "shut-off head", "shutoff tdh", "shut off head"],
        &[],
    ),
    (
        "pump efficiency",
        &["pump efficiency", "efficiency", "eff."],
        &["motor"],
    ),
    (
        "npshr",
        &["npshr", "npsh required", "npsh3", "npsh r"],
        &["npsha", "available"],
    ),
    ("speed", &["rated speed", "speed", "rpm"], &["specific speed"]),
    (
        "power",
        &["rated power", "absorbed power", "shaft power", "power input", "bkw", "power"],
        &["motor"],
    ),
    (
        "motor rating",
        &["motor rating", "motor power", "motor size", "motor kw", "motor"],
        &["efficiency"],
    ),
    (
        "impeller diameter",
        &["impeller diameter", "impeller dia", "impeller size", "impeller"],
        &["material"],
    ),
    (
        "fluid temperature",
        &["fluid temperature", "liquid temperature", "pumping temperature", "temperature", "temp"],
        &["ambient"],
    ),
    (
        "specific gravity",
        &["specific gravity", "sg", "density"],
        &[],
    ),
];

impl Default for FieldSchema {
    fn default() -> Self {
        Self::default_schema()
    }
}

impl FieldSchema {
    /// The 13-field pump-datasheet schema.
    pub fn default_schema() -> Self {
        let mut schema = Self {
            fields: Vec::with_capacity(DEFAULT_FIELDS.len()),
            rules: HashMap::with_capacity(DEFAULT_FIELDS.len()),
        };
        for (name, match_terms, exclude) in DEFAULT_FIELDS {
            schema.fields.push(name.to_string());
            schema
                .rules
                .insert(name.to_string(), MatchRule::new(match_terms, exclude));
        }
        schema
    }

    /// Schema for a caller-supplied field list.
    ///
    /// Names are trimmed, blanks dropped, duplicates removed (first wins).
    /// Names from the default vocabulary keep their rule; others match on
    /// their literal name. An empty list yields [`FieldSchema::default_schema`].
    pub fn for_fields<S: AsRef<str>>(names: &[S]) -> Self {
        let defaults = Self::default_schema();
        let mut seen = HashSet::new();
        let mut schema = Self {
            fields: Vec::new(),
            rules: HashMap::new(),
        };

        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || !seen.insert(name.to_string()) {
                continue;
            }
            schema.fields.push(name.to_string());
            if let Some(rule) = defaults.rules.get(name) {
                schema.rules.insert(name.to_string(), rule.clone());
            }
        }

        if schema.fields.is_empty() {
            return defaults;
        }
        schema
    }

    /// Attach or replace the rule for `name`, adding the field if absent.
    pub fn with_rule(mut self, name: impl Into<String>, rule: MatchRule) -> Self {
        let name = name.into();
        if !self.fields.contains(&name) {
            self.fields.push(name.clone());
        }
        self.rules.insert(name, rule);
        self
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn rule(&self, name: &str) -> Option<&MatchRule> {
        self.rules.get(name)
    }

    /// Terms that identify `name`: its rule's match list, else the name itself.
    pub fn match_terms(&self, name: &str) -> Vec<String> {
        match self.rules.get(name) {
            Some(rule) if !rule.match_terms.is_empty() => rule.match_terms.clone(),
            _ => vec![name.to_string()],
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schema_has_thirteen_ordered_fields() {
        let schema = FieldSchema::default_schema();
        assert_eq!(schema.len(), 13);
        assert_eq!(schema.fields()[0], "pump model name");
        assert_eq!(schema.fields()[12], "specific gravity");
        assert!(schema
            .rule("rated head")
            .unwrap()
            .exclude
            .contains(&"shutoff".to_string()));
    }

    #[test]
    fn for_fields_dedupes_and_keeps_known_rules() {
        let schema = FieldSchema::for_fields(&[" speed ", "", "custom thing", "speed"]);
        assert_eq!(schema.fields(), &["speed".to_string(), "custom thing".to_string()]);
        assert!(schema.rule("speed").is_some());
        assert!(schema.rule("custom thing").is_none());
        assert_eq!(schema.match_terms("custom thing"), vec!["custom thing"]);
    }

    #[test]
    fn for_fields_empty_is_default() {
        let schema = FieldSchema::for_fields::<&str>(&[]);
        assert_eq!(schema, FieldSchema::default_schema());
        let schema = FieldSchema::for_fields(&["  "]);
        assert_eq!(schema.len(), 13);
    }

    #[test]
    fn with_rule_adds_field() {
        let schema = FieldSchema::for_fields(&["speed"])
            .with_rule("shutoffTDH", MatchRule::new(&["shutoff tdh"], &["tdh"]));
        assert_eq!(schema.fields().last().map(String::as_str), Some("shutoffTDH"));
        assert_eq!(schema.match_terms("shutoffTDH"), vec!["shutoff tdh"]);
    }

    #[test]
    fn alias_targets_deserialise_from_string_or_null() {
        let aliases: AliasMap =
            serde_json::from_str(r#"{"head": "rated head", "old": null, "gone": "  "}"#).unwrap();
        assert_eq!(aliases["head"], AliasTarget::Rename("rated head".into()));
        assert_eq!(aliases["old"], AliasTarget::Deleted);
        assert_eq!(aliases["gone"], AliasTarget::Deleted);
    }

    #[test]
    fn match_rule_uses_match_key_in_json() {
        let rule: MatchRule = serde_json::from_str(r#"{"match": ["a"], "exclude": ["b"]}"#).unwrap();
        assert_eq!(rule, MatchRule::new(&["a"], &["b"]));
    }
}
