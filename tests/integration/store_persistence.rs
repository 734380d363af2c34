use crate::integration::support::key;
use chrono::{TimeZone, Utc};
use playbook_sync::store::{load_records, temp_path_for, STORE_VERSION};
use playbook_sync::{Record, RecordStore, StorageError};
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_legacy_cache_is_rewritten_as_envelope() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cache.json");
    fs::write(
        &path,
        r#"{
            "accounts:YMCA": {
                "text": "non-profit",
                "url": "https://ymca.org",
                "marketing_pitch": "Pitch text...",
                "crawled_content": {"industry": "nonprofit"},
                "last_updated": "2024-05-01T12:30:00"
            }
        }"#,
    )
    .unwrap();

    let store = RecordStore::open(&path).unwrap();
    assert_eq!(store.len(), 1);
    store.save().unwrap();

    let document: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(document["version"], json!(STORE_VERSION));
    let record = &document["records"]["accounts:YMCA"];
    assert_eq!(record["key"], "accounts:YMCA");
    assert_eq!(record["source_text"], "non-profit");
    assert_eq!(record["generated_content"], "Pitch text...");
    assert_eq!(record["structured_content"], Value::Null);

    let reloaded = load_records(&path).unwrap();
    assert_eq!(
        reloaded[&key("accounts:YMCA")].last_updated,
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    );
}

#[test]
fn test_saved_records_spell_out_absent_fields() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("store.json");

    let mut store = RecordStore::open(&path).unwrap();
    store.put(Record::new(key("industries:Healthcare"), Utc::now()));
    store.save().unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    let document: Value = serde_json::from_str(&raw).unwrap();
    let record = document["records"]["industries:Healthcare"].as_object().unwrap();
    for field in [
        "source_text",
        "source_url",
        "fetched_content",
        "generated_content",
        "structured_content",
    ] {
        assert_eq!(record.get(field), Some(&Value::Null), "{field}");
    }
    assert!(!temp_path_for(&path).exists());
}

#[test]
fn test_reopen_sees_every_checkpoint() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.json");

    let mut store = RecordStore::open(&path).unwrap();
    for raw in ["accounts:YMCA", "accounts:Acme", "personas:VP: Finance"] {
        let mut record = Record::new(key(raw), Utc::now());
        record.generated_content = Some(format!("pitch for {}", key(raw).name()));
        store.put(record);
        store.save().unwrap();
        assert!(load_records(&path).unwrap().contains_key(&key(raw)));
    }

    let reopened = RecordStore::open(&path).unwrap();
    assert_eq!(reopened.records(), store.records());
    assert_eq!(
        reopened
            .get(&key("personas:VP: Finance"))
            .unwrap()
            .generated_content
            .as_deref(),
        Some("pitch for VP: Finance")
    );
}

#[test]
fn test_mismatched_embedded_key_is_corrupt() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.json");
    let mut record = serde_json::to_value(Record::new(key("accounts:Acme"), Utc::now())).unwrap();
    record["key"] = json!("accounts:Other");
    let document = json!({"version": STORE_VERSION, "records": {"accounts:Acme": record}});
    fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();

    assert!(matches!(
        RecordStore::open(&path),
        Err(StorageError::Corrupt { .. })
    ));
}

#[test]
fn test_stray_temp_file_does_not_affect_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.json");

    let mut store = RecordStore::open(&path).unwrap();
    store.put(Record::new(key("accounts:YMCA"), Utc::now()));
    store.save().unwrap();

    // Simulates a crash between writing the temp file and renaming it.
    fs::write(temp_path_for(&path), "{ half written").unwrap();
    let reopened = RecordStore::open(&path).unwrap();
    assert_eq!(reopened.len(), 1);

    // The next save replaces it.
    reopened.save().unwrap();
    assert!(!temp_path_for(&path).exists());
}
