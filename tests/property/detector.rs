use chrono::Utc;
use playbook_sync::{detect_changes, EntityKey, Observation, Record};
use proptest::prelude::*;
use serde_json::json;

fn key() -> EntityKey {
    EntityKey::parse("accounts:YMCA").unwrap()
}

fn text() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[a-z ]{0,12}")
}

fn url() -> impl Strategy<Value = Option<String>> {
    prop::option::of("https://[a-z]{1,8}\\.org")
}

fn observation(text: Option<String>, url: Option<String>) -> Observation {
    Observation::text(key(), text, url)
}

/// The record a successful run leaves behind for `obs`.
fn synced_record(obs: &Observation) -> Record {
    let mut record = Record::new(key(), Utc::now());
    record.apply_observation(obs);
    if obs.fetch_url().is_some() {
        record.fetched_content = Some(json!({"summary": "page"}));
    }
    record.generated_content = Some("pitch".to_string());
    record
}

proptest! {
    #[test]
    fn synced_entity_is_clean(text in text(), url in url()) {
        let obs = observation(text, url);
        let record = synced_record(&obs);
        prop_assert!(detect_changes(&obs, Some(&record)).is_clean());
    }

    #[test]
    fn fetch_is_only_requested_with_a_url(
        text in text(),
        url in url(),
        cached_text in text(),
        cached_url in url(),
        cached_exists in any::<bool>(),
    ) {
        let obs = observation(text, url);
        let cached = cached_exists.then(|| synced_record(&observation(cached_text, cached_url)));
        let changes = detect_changes(&obs, cached.as_ref());
        if changes.flags.needs_fetch {
            prop_assert!(obs.fetch_url().is_some());
        }
    }

    #[test]
    fn text_only_change_regenerates_without_fetch(
        old_text in "[a-z]{1,10}",
        new_text in "[a-z]{1,10}",
        url in url(),
    ) {
        prop_assume!(old_text != new_text);
        let record = synced_record(&observation(Some(old_text), url.clone()));
        let changes = detect_changes(&observation(Some(new_text), url), Some(&record));
        prop_assert!(changes.flags.needs_generate);
        prop_assert!(!changes.flags.needs_fetch);
        prop_assert!(changes.flags.is_modified);
    }

    #[test]
    fn url_change_requires_generation(
        text in text(),
        old_url in url(),
        new_url in url(),
    ) {
        prop_assume!(old_url != new_url);
        let record = synced_record(&observation(text.clone(), old_url));
        let obs = observation(text, new_url);
        let changes = detect_changes(&obs, Some(&record));
        prop_assert!(changes.flags.needs_generate);
        prop_assert_eq!(changes.flags.needs_fetch, obs.fetch_url().is_some());
    }

    #[test]
    fn unknown_entity_always_generates(text in text(), url in url()) {
        let obs = observation(text, url);
        let changes = detect_changes(&obs, None);
        prop_assert!(changes.flags.needs_generate);
        prop_assert!(changes.flags.is_modified);
    }
}
