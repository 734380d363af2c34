//! Core types: entity keys, persisted records, and per-run observations.

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Identifies one tracked entity as `<category>:<name>`.
///
/// The category never contains the separator; the name may (everything after the
/// first `:` belongs to the name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityKey {
    category: String,
    name: String,
}

impl EntityKey {
    pub const SEPARATOR: char = ':';

    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Result<Self, StorageError> {
        let category = category.into();
        let name = name.into();
        if category.trim().is_empty() {
            return Err(StorageError::InvalidKey(format!(
                "empty category in key '{}{}{}'",
                category,
                Self::SEPARATOR,
                name
            )));
        }
        if category.contains(Self::SEPARATOR) {
            return Err(StorageError::InvalidKey(format!(
                "category '{}' must not contain '{}'",
                category,
                Self::SEPARATOR
            )));
        }
        if name.trim().is_empty() {
            return Err(StorageError::InvalidKey(format!(
                "empty name in category '{}'",
                category
            )));
        }
        Ok(Self { category, name })
    }

    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let (category, name) = raw.split_once(Self::SEPARATOR).ok_or_else(|| {
            StorageError::InvalidKey(format!(
                "'{}' is not of the form <category>{}<name>",
                raw,
                Self::SEPARATOR
            ))
        })?;
        Self::new(category, name)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.category, Self::SEPARATOR, self.name)
    }
}

impl FromStr for EntityKey {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EntityKey {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EntityKey> for String {
    fn from(key: EntityKey) -> Self {
        key.to_string()
    }
}

/// Persisted state for one entity.
///
/// Optional fields serialize as explicit `null` so an absent value is never
/// confused with an empty one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: EntityKey,
    pub source_text: Option<String>,
    pub source_url: Option<String>,
    pub fetched_content: Option<Value>,
    pub generated_content: Option<String>,
    pub structured_content: Option<Value>,
    pub last_updated: DateTime<Utc>,
}

impl Record {
    /// Empty record for a key seen for the first time.
    pub fn new(key: EntityKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            source_text: None,
            source_url: None,
            fetched_content: None,
            generated_content: None,
            structured_content: None,
            last_updated: now,
        }
    }

    pub fn has_fetched_content(&self) -> bool {
        self.fetched_content
            .as_ref()
            .map_or(false, |content| !is_empty_value(content))
    }

    pub fn has_generated_content(&self) -> bool {
        self.generated_content
            .as_deref()
            .map_or(false, |content| !content.trim().is_empty())
    }

    /// Field-wise equality ignoring `last_updated`.
    pub fn same_content(&self, other: &Record) -> bool {
        self.key == other.key
            && self.source_text == other.source_text
            && self.source_url == other.source_url
            && self.fetched_content == other.fetched_content
            && self.generated_content == other.generated_content
            && self.structured_content == other.structured_content
    }

    /// Copy the observed input fields onto this record.
    ///
    /// Fetched content is dropped when the observation no longer carries a URL:
    /// it describes a reference the entity no longer has.
    pub fn apply_observation(&mut self, observation: &Observation) {
        if observation.source_url.is_none() {
            self.fetched_content = None;
        }
        self.source_text = observation.source_text.clone();
        self.source_url = observation.source_url.clone();
        self.structured_content = observation.structured_content.clone();
    }

    /// Put back the input fields of `prior` together with the content fetched
    /// for them. Generated content produced since is kept.
    ///
    /// Used when a stage failed: the next run must still see the entity as
    /// changed, and fetched content always stays paired with the URL it came from.
    pub fn restore_inputs(&mut self, prior: &Record) {
        self.source_text = prior.source_text.clone();
        self.source_url = prior.source_url.clone();
        self.structured_content = prior.structured_content.clone();
        self.fetched_content = prior.fetched_content.clone();
    }

    /// Plain-text rendering used as shared background for generation.
    pub fn context_text(&self) -> String {
        let mut sections = Vec::new();
        if let Some(text) = self.source_text.as_deref() {
            sections.push(format!("Description: {}", text));
        }
        if let Some(url) = self.source_url.as_deref() {
            sections.push(format!("Website: {}", url));
        }
        if let Some(Value::Object(fields)) = &self.structured_content {
            for (label, value) in fields {
                match value {
                    Value::String(s) => sections.push(format!("{}: {}", label, s)),
                    Value::Null => {}
                    other => sections.push(format!("{}: {}", label, other)),
                }
            }
        }
        if let Some(fetched) = self.fetched_content.as_ref().filter(|v| !is_empty_value(v)) {
            sections.push(format!("Website summary: {}", fetched));
        }
        sections.join("\n")
    }
}

/// What the input source reported for one entity on this run.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub key: EntityKey,
    pub source_text: Option<String>,
    pub source_url: Option<String>,
    pub structured_content: Option<Value>,
}

impl Observation {
    /// Free-text entity. Blank strings are normalized to absent.
    pub fn text(key: EntityKey, source_text: Option<String>, source_url: Option<String>) -> Self {
        Self {
            key,
            source_text: non_blank(source_text),
            source_url: non_blank(source_url),
            structured_content: None,
        }
    }

    /// Entity whose source is itself a structured record.
    pub fn structured(
        key: EntityKey,
        source_text: Option<String>,
        source_url: Option<String>,
        structured_content: Value,
    ) -> Self {
        Self {
            structured_content: Some(structured_content),
            ..Self::text(key, source_text, source_url)
        }
    }

    /// The URL a fetch would use, if any.
    pub fn fetch_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `null`, blank strings, and empty containers carry no content.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
