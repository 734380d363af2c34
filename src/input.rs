//! Input Source
//!
//! Loads the operator's playbook (a company profile plus target sections) and
//! turns it into the per-run snapshot of observations the pipeline diffs against
//! the record store.
//!
//! Company file: `{ "<label>": { "data": [ { "value": ... } ] }, ... }`.
//! Target file: `{ "<Section>": { "<name>": { "data": [ { "type": "text"|"url", "value": ... } ] } } }`.

use crate::error::ApiError;
use crate::types::{EntityKey, Observation};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Category of the company profile entity.
pub const COMPANY_CATEGORY: &str = "company";

const NAME_LABEL: &str = "Company Name";
const WEBSITE_LABEL: &str = "Company Website";
const DESCRIPTION_LABEL: &str = "Company Description";

/// Everything the pipeline sees on one run, in processing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Entity whose record supplies shared context to every other entity.
    pub context_key: Option<EntityKey>,
    pub observations: Vec<Observation>,
}

impl Snapshot {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self {
            context_key: None,
            observations,
        }
    }

    pub fn with_context(mut self, key: EntityKey) -> Self {
        self.context_key = Some(key);
        self
    }

    /// Keep only the given categories. The context entity always stays.
    pub fn retain_categories(&mut self, categories: &[String]) {
        let context_key = self.context_key.clone();
        self.observations.retain(|obs| {
            Some(&obs.key) == context_key.as_ref()
                || categories.iter().any(|c| c == obs.key.category())
        });
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.observations.iter().map(|obs| &obs.key)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Supplies the current snapshot once per run.
pub trait InputSource {
    fn snapshot(&self) -> Result<Snapshot, ApiError>;
}

#[derive(Debug, Deserialize)]
struct LabeledField {
    #[serde(default)]
    data: Vec<LabeledValue>,
}

#[derive(Debug, Deserialize)]
struct LabeledValue {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    value: Value,
}

/// The operator's own company, as described in the playbook.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyProfile {
    pub name: String,
    pub website: Option<String>,
    pub description: Option<String>,
    /// Every label with its first value, labels trimmed, file order kept.
    pub fields: Map<String, Value>,
}

impl CompanyProfile {
    pub fn from_value(document: &Value) -> Result<Self, ApiError> {
        let Value::Object(labels) = document else {
            return Err(ApiError::InvalidInput(
                "company profile must be a JSON object".to_string(),
            ));
        };

        let mut fields = Map::new();
        for (label, raw) in labels {
            let field: LabeledField = serde_json::from_value(raw.clone()).map_err(|e| {
                ApiError::InvalidInput(format!("company field '{}' is malformed: {}", label.trim(), e))
            })?;
            let value = field
                .data
                .into_iter()
                .next()
                .map(|v| v.value)
                .unwrap_or(Value::Null);
            fields.insert(label.trim().to_string(), value);
        }

        let name = required_text(&fields, NAME_LABEL)?;
        let website = required_label(&fields, WEBSITE_LABEL).map(value_text)?;
        let description = required_label(&fields, DESCRIPTION_LABEL).map(value_text)?;

        Ok(Self {
            name,
            website,
            description,
            fields,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ApiError> {
        Self::from_value(&read_json(path.as_ref())?)
    }

    pub fn key(&self) -> Result<EntityKey, ApiError> {
        Ok(EntityKey::new(COMPANY_CATEGORY, self.name.clone())?)
    }

    pub fn observation(&self) -> Result<Observation, ApiError> {
        Ok(Observation::structured(
            self.key()?,
            self.description.clone(),
            self.website.clone(),
            Value::Object(self.fields.clone()),
        ))
    }
}

fn required_label<'a>(fields: &'a Map<String, Value>, label: &str) -> Result<&'a Value, ApiError> {
    fields
        .get(label)
        .ok_or_else(|| ApiError::InvalidInput(format!("company profile is missing '{}'", label)))
}

fn required_text(fields: &Map<String, Value>, label: &str) -> Result<String, ApiError> {
    value_text(required_label(fields, label)?)
        .ok_or_else(|| ApiError::InvalidInput(format!("company profile has an empty '{}'", label)))
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Null | Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

/// One entity listed under a target section.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetEntry {
    pub name: String,
    pub text: Option<String>,
    pub url: Option<String>,
}

/// A target section with its normalized category.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSection {
    pub title: String,
    pub category: String,
    pub entries: Vec<TargetEntry>,
}

/// Section title to key category: `"Healthcare Subverticals"` -> `"healthcare_subverticals"`.
pub fn normalize_section(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Parse the target file. Entries with neither text nor url are dropped.
pub fn parse_targets(document: &Value) -> Result<Vec<TargetSection>, ApiError> {
    let Value::Object(sections) = document else {
        return Err(ApiError::InvalidInput(
            "target file must be a JSON object of sections".to_string(),
        ));
    };

    let mut parsed = Vec::with_capacity(sections.len());
    for (title, section) in sections {
        let category = normalize_section(title);
        if category.is_empty() {
            return Err(ApiError::InvalidInput(format!(
                "section title '{}' has no usable characters",
                title
            )));
        }
        let Value::Object(entities) = section else {
            return Err(ApiError::InvalidInput(format!(
                "section '{}' must map entity names to entries",
                title
            )));
        };

        let mut entries = Vec::with_capacity(entities.len());
        for (name, raw) in entities {
            let field: LabeledField = serde_json::from_value(raw.clone()).map_err(|e| {
                ApiError::InvalidInput(format!("entry '{}' in '{}' is malformed: {}", name, title, e))
            })?;
            let mut entry = TargetEntry {
                name: name.trim().to_string(),
                text: None,
                url: None,
            };
            for item in field.data {
                match item.kind.as_deref() {
                    Some("text") => entry.text = value_text(&item.value),
                    Some("url") => entry.url = value_text(&item.value),
                    _ => {}
                }
            }
            if entry.text.is_none() && entry.url.is_none() {
                debug!(section = %category, name = %entry.name, "Skipping entry without text or url");
                continue;
            }
            entries.push(entry);
        }

        parsed.push(TargetSection {
            title: title.clone(),
            category,
            entries,
        });
    }
    Ok(parsed)
}

/// Build the snapshot: the company first (as context), then targets in file order.
pub fn build_snapshot(
    company: Option<&CompanyProfile>,
    sections: &[TargetSection],
) -> Result<Snapshot, ApiError> {
    let mut snapshot = Snapshot::default();
    let mut seen = HashSet::new();

    if let Some(company) = company {
        let observation = company.observation()?;
        seen.insert(observation.key.clone());
        snapshot.context_key = Some(observation.key.clone());
        snapshot.observations.push(observation);
    }

    for section in sections {
        for entry in &section.entries {
            let key = EntityKey::new(section.category.clone(), entry.name.clone())?;
            if !seen.insert(key.clone()) {
                warn!(key = %key, "Duplicate entity in input; keeping the first occurrence");
                continue;
            }
            snapshot
                .observations
                .push(Observation::text(key, entry.text.clone(), entry.url.clone()));
        }
    }
    Ok(snapshot)
}

/// Playbook files on disk.
#[derive(Debug, Clone)]
pub struct PlaybookSource {
    pub company_path: PathBuf,
    pub targets_path: PathBuf,
    /// Categories to keep; `None` keeps all.
    pub sections: Option<Vec<String>>,
}

impl PlaybookSource {
    pub fn new(company_path: impl Into<PathBuf>, targets_path: impl Into<PathBuf>) -> Self {
        Self {
            company_path: company_path.into(),
            targets_path: targets_path.into(),
            sections: None,
        }
    }

    pub fn with_sections(mut self, sections: Vec<String>) -> Self {
        self.sections = Some(sections.iter().map(|s| normalize_section(s)).collect());
        self
    }
}

impl InputSource for PlaybookSource {
    fn snapshot(&self) -> Result<Snapshot, ApiError> {
        let company = CompanyProfile::load(&self.company_path)?;
        let sections = parse_targets(&read_json(&self.targets_path)?)?;
        let mut snapshot = build_snapshot(Some(&company), &sections)?;
        if let Some(categories) = &self.sections {
            snapshot.retain_categories(categories);
        }
        debug!(entities = snapshot.len(), "Input snapshot loaded");
        Ok(snapshot)
    }
}

fn read_json(path: &Path) -> Result<Value, ApiError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| ApiError::InvalidInput(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| ApiError::InvalidInput(format!("{} is not valid JSON: {}", path.display(), e)))
}
