//! Parsing of collaborator output.
//!
//! The collaborator returns opaque text. Each step expects exactly one shape:
//! a structural result, a mapping result or a relevance verdict. Optional markdown
//! code fences are stripped first; anything empty, unparseable or schema-mismatched
//! becomes [`Error::ServiceResponse`] carrying the raw text.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A semantic label with no geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralUnit {
    pub sequence: u32,
    pub description: String,
}

/// Links a structural unit to 1-based pixel-segment indices. Indices are kept as
/// received (possibly out of range) until the merge step filters them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRecord {
    pub sequence: u32,
    #[serde(alias = "mapped_indices", alias = "indices")]
    pub mapped_indices: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StructuralResult {
    Wrapped {
        #[serde(alias = "structure", alias = "blocks")]
        units: Vec<StructuralUnit>,
    },
    Bare(Vec<StructuralUnit>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MappingResult {
    Wrapped {
        #[serde(alias = "mapping")]
        mappings: Vec<MappingRecord>,
    },
    Bare(Vec<MappingRecord>),
}

#[derive(Debug, Deserialize)]
struct RelevanceResult {
    related: bool,
}

/// Removes a surrounding markdown code fence (with or without a language tag).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn parse_shape<T: DeserializeOwned>(raw: &str, shape: &str) -> Result<T> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(Error::response(format!("empty {shape} response"), raw));
    }
    serde_json::from_str(body).map_err(|e| Error::response(format!("unparseable {shape} response: {e}"), raw))
}

/// Ordered structural units, sorted by `sequence`. An empty list is an error.
pub fn parse_structural(raw: &str) -> Result<Vec<StructuralUnit>> {
    let mut units = match parse_shape::<StructuralResult>(raw, "structural")? {
        StructuralResult::Wrapped { units } | StructuralResult::Bare(units) => units,
    };
    if units.is_empty() {
        return Err(Error::response("structural response listed no units", raw));
    }
    units.sort_by_key(|unit| unit.sequence);
    Ok(units)
}

pub fn parse_mapping(raw: &str) -> Result<Vec<MappingRecord>> {
    match parse_shape::<MappingResult>(raw, "mapping")? {
        MappingResult::Wrapped { mappings } | MappingResult::Bare(mappings) => Ok(mappings),
    }
}

pub fn parse_relevance(raw: &str) -> Result<bool> {
    parse_shape::<RelevanceResult>(raw, "relevance").map(|r| r.related)
}
