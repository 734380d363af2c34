//! Durable JSON representation of the record mapping.
//!
//! The store is a single file holding a versioned envelope. Every save is a
//! full snapshot written to a sibling temporary file and renamed into place, so
//! a crash mid-write leaves the previous snapshot intact.

use crate::error::StorageError;
use crate::stage::fetch::is_unusable_fetch;
use crate::types::{EntityKey, Record};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const STORE_VERSION: u32 = 1;

/// In-memory form of the whole store.
pub type RecordMap = BTreeMap<EntityKey, Record>;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    records: BTreeMap<String, Record>,
}

/// Record shape written by earlier releases: a bare mapping without a version
/// envelope, keyed fields named after the pitch workflow.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyRecord {
    text: Option<String>,
    url: Option<String>,
    marketing_pitch: Option<String>,
    crawled_content: Option<Value>,
    content: Option<Value>,
    last_updated: Option<String>,
}

/// Load the record mapping from `path`.
///
/// A missing file is an empty store. Anything unreadable is fatal: no partially
/// parsed store is ever returned.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<RecordMap, StorageError> {
    let path = path.as_ref();
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RecordMap::new()),
        Err(e) => return Err(StorageError::IoError(e)),
    };

    let document: Value = serde_json::from_slice(&bytes).map_err(|e| corrupt(path, e))?;
    let Value::Object(top) = &document else {
        return Err(corrupt(path, "top-level value is not an object"));
    };

    if top.contains_key("version") && top.contains_key("records") {
        decode_envelope(path, document)
    } else {
        decode_legacy(path, document)
    }
}

fn decode_envelope(path: &Path, document: Value) -> Result<RecordMap, StorageError> {
    let file: StoreFile = serde_json::from_value(document).map_err(|e| corrupt(path, e))?;
    if file.version != STORE_VERSION {
        return Err(StorageError::UnsupportedVersion {
            found: file.version,
            expected: STORE_VERSION,
        });
    }

    let mut records = RecordMap::new();
    for (raw_key, record) in file.records {
        let key = EntityKey::parse(&raw_key).map_err(|e| corrupt(path, e))?;
        if record.key != key {
            return Err(corrupt(
                path,
                format!("entry '{}' carries mismatched key '{}'", raw_key, record.key),
            ));
        }
        records.insert(key, record);
    }
    Ok(records)
}

fn decode_legacy(path: &Path, document: Value) -> Result<RecordMap, StorageError> {
    let legacy: BTreeMap<String, LegacyRecord> =
        serde_json::from_value(document).map_err(|e| corrupt(path, e))?;

    let mut records = RecordMap::new();
    for (raw_key, entry) in legacy {
        let key = EntityKey::parse(&raw_key).map_err(|e| corrupt(path, e))?;
        let last_updated = match entry.last_updated.as_deref() {
            Some(raw) => parse_legacy_timestamp(raw).ok_or_else(|| {
                corrupt(
                    path,
                    format!("entry '{}' has unreadable timestamp '{}'", raw_key, raw),
                )
            })?,
            None => DateTime::<Utc>::default(),
        };
        let record = Record {
            key: key.clone(),
            source_text: entry.text,
            source_url: entry.url,
            fetched_content: entry.crawled_content.and_then(legacy_fetched_content),
            generated_content: entry.marketing_pitch,
            structured_content: entry.content.filter(|v| !v.is_null()),
            last_updated,
        };
        records.insert(key, record);
    }
    Ok(records)
}

/// Earlier releases stored the crawler's whole result, `{success, url, data, error}`.
/// Only the `data` of a successful crawl counts as fetched content; a failed or
/// inconclusive crawl imports as missing so it is fetched again.
fn legacy_fetched_content(crawled: Value) -> Option<Value> {
    let content = match crawled {
        Value::Object(mut wrapper) if wrapper.contains_key("success") => {
            if wrapper.get("success") != Some(&Value::Bool(true)) {
                return None;
            }
            wrapper.remove("data")?
        }
        other => other,
    };
    Some(content).filter(|content| !is_unusable_fetch(content))
}

fn parse_legacy_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Write the full mapping to `path`, replacing the previous snapshot atomically.
pub fn save_records<P: AsRef<Path>>(path: P, records: &RecordMap) -> Result<(), StorageError> {
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file = StoreFile {
        version: STORE_VERSION,
        records: records
            .iter()
            .map(|(key, record)| (key.to_string(), record.clone()))
            .collect(),
    };
    let serialized = serde_json::to_vec_pretty(&file)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    let temp_path = temp_path_for(path);
    let write_result = (|| -> Result<(), std::io::Error> {
        let mut temp = fs::File::create(&temp_path)?;
        temp.write_all(&serialized)?;
        temp.sync_all()?;
        Ok(())
    })();
    if let Err(e) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(StorageError::IoError(e));
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StorageError::IoError(e)
    })?;

    Ok(())
}

/// Sibling path used for the in-progress write.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn corrupt(path: &Path, reason: impl ToString) -> StorageError {
    StorageError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
