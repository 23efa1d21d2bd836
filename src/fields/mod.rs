//! Structured field extraction from table Markdown.
//!
//! ```text
//! markdown ──▶ truncate ──▶ model (JSON) ──┬──▶ aliases ──▶ normalise
//!                               │ fallback │
//!                               └─▶ heuristic
//! ```
//!
//! - [`schema`]   : field names, match/exclude rules, aliases
//! - [`json`]     : two-stage JSON salvage of the model answer
//! - [`heuristic`]: regex scanner used when the model path yields nothing
//! - [`extract`]  : prompt building, alias reconciliation, normalisation

pub mod extract;
pub mod heuristic;
pub mod json;
pub mod schema;

pub use extract::{
    apply_aliases, build_extraction_prompt, extract_fields, normalize_fields, normalize_value,
    truncate_markdown,
};
pub use heuristic::heuristic_extract;
pub use json::{parse_model_json, ParsedJson};
pub use schema::{AliasMap, AliasTarget, FieldSchema, MatchRule};
