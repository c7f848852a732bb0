//! Dry runs
//!
//! A dry run reads the configured stores and usage file once, then must not
//! write to any of them or reach the generative service.

use std::sync::Arc;

use tempfile::TempDir;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, ResponseTemplate};

use autopost::config::Config;
use autopost::models::{ProgressDelta, StopReason};
use autopost::runner::{assemble, RunMode};
use autopost::storage::{Collaborators, DailyProgressStore, SqliteStore};

use super::fixtures::{fast_settings, sample_accounts, sample_credentials, sample_keywords, test_clock};

const USAGE: &str = r#"{
  "GEMINI_API_KEY1": {
    "date": "2025-03-14",
    "count": 7
  }
}"#;

#[tokio::test]
async fn test_dry_run_leaves_usage_and_stores_untouched() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let usage_path = dir.path().join("credential_usage.json");
    std::fs::write(&usage_path, USAGE).unwrap();

    let store = Arc::new(SqliteStore::new(dir.path().join("autopost.db"), test_clock()).unwrap());
    for account in sample_accounts(2) {
        store.upsert_account(&account).unwrap();
    }
    store.add_keywords(sample_keywords(6)).unwrap();
    store.set_goal(2).unwrap();

    let mut config = Config::default();
    config.generator.endpoint = server.uri();
    config.storage.usage_path = usage_path.clone();

    let runner = assemble(
        &config,
        Collaborators::from_backend(store.clone(), store.clone()),
        sample_credentials(2),
        test_clock(),
        RunMode::DryRun,
        fast_settings(),
    )
    .await
    .unwrap();
    let summary = runner.run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::GoalReached);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.flushed, 4);

    assert_eq!(std::fs::read_to_string(&usage_path).unwrap(), USAGE);
    assert!(server.received_requests().await.unwrap().is_empty());

    assert_eq!(store.consumed_count().unwrap(), 0);
    assert!(store.published_for("writer1").unwrap().is_empty());
    assert!(store
        .fetch_today()
        .await
        .unwrap()
        .iter()
        .all(|r| r.success_count == 0));
}

#[tokio::test]
async fn test_dry_run_starts_from_stored_progress() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("autopost.db"), test_clock()).unwrap());
    for account in sample_accounts(2) {
        store.upsert_account(&account).unwrap();
    }
    store.add_keywords(sample_keywords(6)).unwrap();
    store.set_goal(3).unwrap();
    store
        .upsert_batch(
            &[ProgressDelta {
                account: "writer1".into(),
                delta: 2,
            }],
            None,
        )
        .await
        .unwrap();

    let mut config = Config::default();
    config.storage.usage_path = dir.path().join("missing_usage.json");

    let summary = assemble(
        &config,
        Collaborators::from_backend(store.clone(), store.clone()),
        sample_credentials(1),
        test_clock(),
        RunMode::DryRun,
        fast_settings(),
    )
    .await
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(summary.target.global_goal, 4);
    assert_eq!(summary.succeeded, 4);
    assert!(!dir.path().join("missing_usage.json").exists());
}
