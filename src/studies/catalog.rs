//! Study catalog parsing with partial success.
//!
//! A bad entry never hides the good ones: every entry is validated on its
//! own, valid studies are kept, and each failure is reported as a message.

use std::fs;
use std::path::Path;

use toml::{Table, Value};
use url::Url;

use crate::error::CatalogError;

/// A weighted destination candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Study {
    pub url: String,
    pub weight: f64,
    pub note: Option<String>,
}

impl Study {
    pub fn new(url: impl Into<String>, weight: f64) -> Self {
        Self {
            url: url.into(),
            weight,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// A study is eligible for selection when its weight is positive.
    pub fn is_eligible(&self) -> bool {
        self.weight > 0.0
    }
}

/// Valid studies alongside the problems found while reading them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogParseResult {
    pub studies: Vec<Study>,
    pub errors: Vec<String>,
}

impl CatalogParseResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Reads and parses a TOML studies file.
pub fn parse_studies_file(path: &Path) -> Result<CatalogParseResult, CatalogError> {
    let content = fs::read_to_string(path).map_err(CatalogError::Unreadable)?;
    parse_studies_str(&content)
}

/// Parses TOML studies content.
///
/// Accepts both `studies = [{...}]` and `[[studies]]` forms.
pub fn parse_studies_str(content: &str) -> Result<CatalogParseResult, CatalogError> {
    let root = content
        .parse::<Table>()
        .map_err(|e: toml::de::Error| CatalogError::InvalidToml(e.message().to_string()))?;

    let entries = match root.get("studies") {
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(CatalogError::StudiesNotArray),
        None => return Err(CatalogError::MissingStudies),
    };

    let mut result = CatalogParseResult::default();

    for (idx, entry) in entries.iter().enumerate() {
        match parse_entry(entry) {
            Ok(study) => result.studies.push(study),
            Err(reason) => result.errors.push(format!("Study {}: {}", idx + 1, reason)),
        }
    }

    if result.studies.is_empty() {
        result.errors.push("No valid studies found".to_string());
    } else if result.studies.iter().all(|s| s.weight == 0.0) {
        result
            .errors
            .push("At least one study must have a positive weight".to_string());
    }

    Ok(result)
}

/// Validates one catalog entry, returning the reason on failure.
fn parse_entry(entry: &Value) -> Result<Study, String> {
    let table = entry
        .as_table()
        .ok_or_else(|| "expected a table".to_string())?;

    let url = table
        .get("url")
        .ok_or_else(|| "missing required key 'url'".to_string())?;
    let weight = table
        .get("weight")
        .ok_or_else(|| "missing required key 'weight'".to_string())?;

    let url = parse_url(url)?;
    let weight = parse_weight(weight)?;
    let note = table.get("note").map(|n| match n {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });

    Ok(Study { url, weight, note })
}

/// Accepts only absolute URLs with both a scheme and a host.
fn parse_url(value: &Value) -> Result<String, String> {
    let raw = match value {
        Value::String(s) => s.trim(),
        other => return Err(format!("invalid URL '{}'", other)),
    };

    match Url::parse(raw) {
        Ok(parsed) if parsed.has_host() && !parsed.scheme().is_empty() => Ok(raw.to_string()),
        _ => Err(format!("invalid URL '{}'", raw)),
    }
}

fn parse_weight(value: &Value) -> Result<f64, String> {
    let weight = match value {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        _ => return Err("weight must be a number".to_string()),
    };

    if !weight.is_finite() {
        return Err("weight must be a finite number".to_string());
    }
    if weight < 0.0 {
        return Err(format!("weight must be non-negative, got {}", weight));
    }

    Ok(weight)
}
