use crate::integration::support::{key, observe, pipeline, FakeFetcher, FakeGenerator, Failure, ATTEMPTS};
use playbook_sync::stage::{FailureKind, StageKind, UNABLE_TO_DETERMINE};
use playbook_sync::store::load_records;
use playbook_sync::{render_pass, ApiError, ChangeReason, EntityOutcome, Snapshot, StorageError};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

const YMCA: &str = "accounts:YMCA";
const YMCA_URL: &str = "https://ymca.org";

fn ymca(text: &str, url: &str) -> Snapshot {
    Snapshot::new(vec![observe(YMCA, Some(text), Some(url))])
}

#[tokio::test]
async fn test_first_run_then_unchanged_rerun_makes_no_calls() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();
    fetcher.respond(YMCA_URL, json!({"industry": "nonprofit"}));
    generator.respond(YMCA, "Pitch text...");

    let mut first = pipeline(&store_path, &fetcher, &generator);
    let report = first.run(&ymca("non-profit", YMCA_URL)).await.unwrap();
    assert_eq!(report.entity(&key(YMCA)).unwrap().outcome, EntityOutcome::New);
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(generator.call_count(), 1);

    let stored = load_records(&store_path).unwrap();
    let record = &stored[&key(YMCA)];
    assert_eq!(record.source_text.as_deref(), Some("non-profit"));
    assert_eq!(record.fetched_content, Some(json!({"industry": "nonprofit"})));
    assert_eq!(record.generated_content.as_deref(), Some("Pitch text..."));
    let stamped = record.last_updated;

    // The generator saw the fetched content alongside the text.
    let request = generator.calls.lock()[0].clone();
    assert_eq!(request.source_text.as_deref(), Some("non-profit"));
    assert_eq!(request.fetched_content, Some(json!({"industry": "nonprofit"})));

    let mut second = pipeline(&store_path, &fetcher, &generator);
    let report = second.run(&ymca("non-profit", YMCA_URL)).await.unwrap();
    let entity = report.entity(&key(YMCA)).unwrap();
    assert_eq!(entity.outcome, EntityOutcome::Skipped);
    assert!(!entity.persisted);
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(generator.call_count(), 1);
    assert_eq!(load_records(&store_path).unwrap()[&key(YMCA)].last_updated, stamped);
}

#[tokio::test]
async fn test_url_change_refetches_and_regenerates() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();

    pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("non-profit", YMCA_URL))
        .await
        .unwrap();

    fetcher.respond("https://ymca.net", json!({"industry": "fitness"}));
    generator.respond(YMCA, "New pitch");
    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("non-profit", "https://ymca.net"))
        .await
        .unwrap();

    let entity = report.entity(&key(YMCA)).unwrap();
    assert_eq!(entity.outcome, EntityOutcome::Updated);
    assert!(entity.reasons.contains(&ChangeReason::UrlChanged));
    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(generator.call_count(), 2);

    let record = &load_records(&store_path).unwrap()[&key(YMCA)];
    assert_eq!(record.source_url.as_deref(), Some("https://ymca.net"));
    assert_eq!(record.fetched_content, Some(json!({"industry": "fitness"})));
    assert_eq!(record.generated_content.as_deref(), Some("New pitch"));
}

#[tokio::test]
async fn test_text_change_regenerates_without_fetch() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();

    pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("non-profit", YMCA_URL))
        .await
        .unwrap();

    generator.respond(YMCA, "Pitch for a youth charity");
    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("youth charity", YMCA_URL))
        .await
        .unwrap();

    assert_eq!(report.entity(&key(YMCA)).unwrap().reasons, vec![ChangeReason::TextChanged]);
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(generator.call_count(), 2);
    let record = &load_records(&store_path).unwrap()[&key(YMCA)];
    assert_eq!(record.source_text.as_deref(), Some("youth charity"));
    assert_eq!(record.generated_content.as_deref(), Some("Pitch for a youth charity"));
}

#[tokio::test]
async fn test_exhausted_generation_keeps_prior_pitch_and_retries_next_run() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();
    generator.respond(YMCA, "Original pitch");

    pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("non-profit", YMCA_URL))
        .await
        .unwrap();
    let before = load_records(&store_path).unwrap()[&key(YMCA)].clone();

    generator.fail(YMCA, Failure::Transient);
    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("youth charity", YMCA_URL))
        .await
        .unwrap();

    let entity = report.entity(&key(YMCA)).unwrap();
    assert_eq!(entity.outcome, EntityOutcome::Failed);
    assert_eq!(entity.failures.len(), 1);
    assert_eq!(entity.failures[0].stage, StageKind::Generate);
    assert_eq!(entity.failures[0].kind, FailureKind::Exhausted);
    assert_eq!(generator.call_count(), 1 + ATTEMPTS as usize);

    let after = &load_records(&store_path).unwrap()[&key(YMCA)];
    assert_eq!(after, &before);

    // The text change is still pending, so the next run tries again.
    let calls_before = generator.call_count();
    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("youth charity", YMCA_URL))
        .await
        .unwrap();
    assert_eq!(report.entity(&key(YMCA)).unwrap().outcome, EntityOutcome::Failed);
    assert!(generator.call_count() > calls_before);
}

#[tokio::test]
async fn test_fatal_generation_is_not_retried() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();
    generator.fail(YMCA, Failure::Fatal);

    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("non-profit", YMCA_URL))
        .await
        .unwrap();

    let entity = report.entity(&key(YMCA)).unwrap();
    assert_eq!(entity.outcome, EntityOutcome::Failed);
    assert_eq!(entity.failures[0].kind, FailureKind::Fatal);
    assert_eq!(generator.call_count(), 1);

    // The fetched content still made it to disk.
    let record = &load_records(&store_path).unwrap()[&key(YMCA)];
    assert!(record.has_fetched_content());
    assert_eq!(record.generated_content, None);
}

#[tokio::test]
async fn test_failed_generation_after_url_change_keeps_url_and_content_paired() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();
    fetcher.respond("https://a.org", json!({"site": "A"}));
    fetcher.respond("https://b.org", json!({"site": "B"}));

    pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("non-profit", "https://a.org"))
        .await
        .unwrap();
    let before = load_records(&store_path).unwrap()[&key(YMCA)].clone();

    generator.fail(YMCA, Failure::Transient);
    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("non-profit", "https://b.org"))
        .await
        .unwrap();
    let entity = report.entity(&key(YMCA)).unwrap();
    assert_eq!(entity.outcome, EntityOutcome::Failed);
    assert_eq!(entity.failures[0].stage, StageKind::Generate);
    assert_eq!(fetcher.calls.lock().last().map(String::as_str), Some("https://b.org"));

    let record = &load_records(&store_path).unwrap()[&key(YMCA)];
    assert_eq!(record.source_url.as_deref(), Some("https://a.org"));
    assert_eq!(record.fetched_content, Some(json!({"site": "A"})));
    assert_eq!(record, &before);

    // Going back to the original URL finds a consistent record with nothing to do.
    let calls = (fetcher.call_count(), generator.call_count());
    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("non-profit", "https://a.org"))
        .await
        .unwrap();
    assert_eq!(report.entity(&key(YMCA)).unwrap().outcome, EntityOutcome::Skipped);
    assert_eq!((fetcher.call_count(), generator.call_count()), calls);
    let record = &load_records(&store_path).unwrap()[&key(YMCA)];
    assert_eq!(record.fetched_content, Some(json!({"site": "A"})));

    // Once generation recovers, the new URL lands with its own content.
    generator.recover(YMCA);
    generator.respond(YMCA, "Pitch from B");
    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("non-profit", "https://b.org"))
        .await
        .unwrap();
    assert_eq!(report.entity(&key(YMCA)).unwrap().outcome, EntityOutcome::Updated);
    let record = &load_records(&store_path).unwrap()[&key(YMCA)];
    assert_eq!(record.source_url.as_deref(), Some("https://b.org"));
    assert_eq!(record.fetched_content, Some(json!({"site": "B"})));
    assert_eq!(record.generated_content.as_deref(), Some("Pitch from B"));
}

#[tokio::test]
async fn test_failed_fetch_keeps_prior_content_and_still_generates() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();
    fetcher.respond(YMCA_URL, json!({"industry": "nonprofit"}));

    pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("non-profit", YMCA_URL))
        .await
        .unwrap();

    fetcher.fail("https://ymca.net", Failure::Transient);
    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("non-profit", "https://ymca.net"))
        .await
        .unwrap();

    let entity = report.entity(&key(YMCA)).unwrap();
    assert_eq!(entity.outcome, EntityOutcome::Failed);
    assert_eq!(entity.failures[0].stage, StageKind::Fetch);
    assert_eq!(fetcher.call_count(), 1 + ATTEMPTS as usize);
    assert_eq!(generator.call_count(), 2);

    let record = &load_records(&store_path).unwrap()[&key(YMCA)];
    assert_eq!(record.fetched_content, Some(json!({"industry": "nonprofit"})));
    // The new URL is not committed until it has been fetched.
    assert_eq!(record.source_url.as_deref(), Some(YMCA_URL));
}

#[tokio::test]
async fn test_unable_to_determine_is_retried_then_given_up() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();
    fetcher.respond(YMCA_URL, json!(UNABLE_TO_DETERMINE));

    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("non-profit", YMCA_URL))
        .await
        .unwrap();

    let entity = report.entity(&key(YMCA)).unwrap();
    assert_eq!(entity.failures[0].kind, FailureKind::Exhausted);
    assert_eq!(fetcher.call_count(), ATTEMPTS as usize);
    assert_eq!(load_records(&store_path).unwrap()[&key(YMCA)].fetched_content, None);
}

#[tokio::test]
async fn test_new_entity_gets_both_contents() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();

    let snapshot = Snapshot::new(vec![
        observe("accounts:Acme", Some("widgets"), Some("https://acme.test")),
        observe("personas:CFO", Some("finance lead"), Some("https://cfo.test")),
    ]);
    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&snapshot)
        .await
        .unwrap();
    assert_eq!(report.counts().new, 2);

    let stored = load_records(&store_path).unwrap();
    for raw in ["accounts:Acme", "personas:CFO"] {
        let record = &stored[&key(raw)];
        assert!(record.has_fetched_content(), "{raw} missing fetched content");
        assert!(record.has_generated_content(), "{raw} missing generated content");
    }
}

#[tokio::test]
async fn test_entity_without_url_is_never_fetched() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();

    let snapshot = Snapshot::new(vec![observe("industries:Healthcare", Some("hospitals"), Some("  "))]);
    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&snapshot)
        .await
        .unwrap();

    assert_eq!(report.counts().new, 1);
    assert!(!report.has_failures());
    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(generator.call_count(), 1);
    assert_eq!(generator.calls.lock()[0].fetched_content, None);

    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&snapshot)
        .await
        .unwrap();
    assert_eq!(report.counts().skipped, 1);
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_failure_does_not_stop_later_entities() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();
    generator.fail("accounts:Acme", Failure::Fatal);

    let snapshot = Snapshot::new(vec![
        observe("accounts:Acme", Some("widgets"), None),
        observe(YMCA, Some("non-profit"), None),
    ]);
    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&snapshot)
        .await
        .unwrap();

    let counts = report.counts();
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.new, 1);
    assert!(report.has_failures());
    assert!(load_records(&store_path).unwrap()[&key(YMCA)].has_generated_content());
}

#[tokio::test]
async fn test_each_entity_is_checkpointed_before_the_next() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();
    generator.watch_store(&store_path);

    let snapshot = Snapshot::new(vec![
        observe("accounts:B", Some("b"), None),
        observe("accounts:A", Some("a"), None),
        observe("accounts:C", Some("c"), None),
    ]);
    pipeline(&store_path, &fetcher, &generator)
        .run(&snapshot)
        .await
        .unwrap();

    // Input order is kept, and each earlier entity is on disk when the next starts.
    let names: Vec<String> = generator
        .calls
        .lock()
        .iter()
        .map(|r| r.key.name().to_string())
        .collect();
    assert_eq!(names, vec!["B", "A", "C"]);
    let seen = generator.seen_on_disk.lock().clone();
    assert_eq!(seen[0], Vec::<String>::new());
    assert_eq!(seen[1], vec!["accounts:B".to_string()]);
    assert_eq!(seen[2], vec!["accounts:A".to_string(), "accounts:B".to_string()]);
}

#[tokio::test]
async fn test_url_removed_clears_fetched_content() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();

    pipeline(&store_path, &fetcher, &generator)
        .run(&ymca("non-profit", YMCA_URL))
        .await
        .unwrap();

    let report = pipeline(&store_path, &fetcher, &generator)
        .run(&Snapshot::new(vec![observe(YMCA, Some("non-profit"), None)]))
        .await
        .unwrap();
    assert_eq!(report.entity(&key(YMCA)).unwrap().outcome, EntityOutcome::Updated);
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(generator.call_count(), 2);

    let record = &load_records(&store_path).unwrap()[&key(YMCA)];
    assert_eq!(record.source_url, None);
    assert_eq!(record.fetched_content, None);
}

#[tokio::test]
async fn test_legacy_failed_crawl_is_fetched_again() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("cache.json");
    fs::write(
        &store_path,
        r#"{
            "accounts:YMCA": {
                "text": "non-profit",
                "url": "https://ymca.org",
                "marketing_pitch": "Old pitch",
                "crawled_content": {"success": false, "url": "https://ymca.org", "data": null, "error": "timeout"},
                "last_updated": "2024-05-01T12:30:00"
            }
        }"#,
    )
    .unwrap();
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();
    fetcher.respond(YMCA_URL, json!({"industry": "nonprofit"}));

    let mut synced = pipeline(&store_path, &fetcher, &generator);
    let report = synced.run(&ymca("non-profit", YMCA_URL)).await.unwrap();
    let entity = report.entity(&key(YMCA)).unwrap();
    assert_eq!(entity.outcome, EntityOutcome::Updated);
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(
        load_records(&store_path).unwrap()[&key(YMCA)].fetched_content,
        Some(json!({"industry": "nonprofit"}))
    );

    let mut rerun = pipeline(&store_path, &fetcher, &generator);
    let report = rerun.run(&ymca("non-profit", YMCA_URL)).await.unwrap();
    assert_eq!(report.entity(&key(YMCA)).unwrap().outcome, EntityOutcome::Skipped);
    assert_eq!(fetcher.call_count(), 1);
}

#[test]
fn test_corrupt_store_refuses_to_open() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    fs::write(&store_path, "{ not json").unwrap();

    let result = playbook_sync::RecordStore::open(&store_path);
    assert!(matches!(result, Err(StorageError::Corrupt { .. })));
    // The broken file is left alone for inspection.
    assert_eq!(fs::read_to_string(&store_path).unwrap(), "{ not json");
}

#[tokio::test]
async fn test_render_pass_after_run_needs_no_external_calls() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();
    generator.fail("accounts:Acme", Failure::Fatal);

    let snapshot = Snapshot::new(vec![
        observe(YMCA, Some("non-profit"), Some(YMCA_URL)),
        observe("accounts:Acme", Some("widgets"), None),
    ]);
    let mut synced = pipeline(&store_path, &fetcher, &generator);
    synced.run(&snapshot).await.unwrap();
    let calls = (fetcher.call_count(), generator.call_count());

    let out_dir = temp_dir.path().join("site");
    let renderer = playbook_sync::render::OutputDirRenderer::new(&out_dir);
    let report = render_pass(synced.store(), &[], &renderer);

    assert_eq!(report.rendered, vec![key(YMCA)]);
    assert_eq!(report.skipped, vec![key("accounts:Acme")]);
    assert!(renderer.path_for(&key(YMCA)).exists());
    assert_eq!((fetcher.call_count(), generator.call_count()), calls);

    let explicit = render_pass(synced.store(), &[key("accounts:Missing")], &renderer);
    assert_eq!(explicit.skipped, vec![key("accounts:Missing")]);
}

#[tokio::test]
async fn test_store_error_ends_the_run() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("state").join("store.json");
    let fetcher = FakeFetcher::new();
    let generator = FakeGenerator::new();
    let mut pipeline = pipeline(&store_path, &fetcher, &generator);
    // A regular file where the store directory should go makes the first checkpoint fail.
    fs::write(temp_dir.path().join("state"), "").unwrap();

    let snapshot = Snapshot::new(vec![
        observe(YMCA, Some("non-profit"), None),
        observe("accounts:Acme", Some("widgets"), None),
    ]);
    let result = pipeline.run(&snapshot).await;

    assert!(matches!(result, Err(ApiError::StorageError(_))));
    assert_eq!(generator.call_count(), 1);
}
