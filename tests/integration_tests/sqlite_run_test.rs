//! Runs against the SQLite backend
//!
//! Progress lives in the database, so a second run on the same day must pick
//! up where the first one stopped.

use std::sync::Arc;

use tempfile::TempDir;

use autopost::credentials::{CredentialSelector, MemoryUsageStore};
use autopost::generator::MockGenerator;
use autopost::models::StopReason;
use autopost::runner::Runner;
use autopost::session::ScriptedLauncher;
use autopost::storage::{Collaborators, DailyProgressStore, SqliteStore};

use super::fixtures::{fast_settings, sample_accounts, sample_credentials, sample_keywords, test_clock};

async fn seeded_store(dir: &TempDir, goal: u32) -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::new(dir.path().join("autopost.db"), test_clock()).unwrap());
    for account in sample_accounts(2) {
        store.upsert_account(&account).unwrap();
    }
    store.add_keywords(sample_keywords(10)).unwrap();
    store.set_goal(goal).unwrap();
    store
}

async fn runner_for(store: Arc<SqliteStore>, goal_override: Option<u32>) -> Runner {
    let credentials = CredentialSelector::load(
        sample_credentials(1),
        Arc::new(MemoryUsageStore::new()),
        test_clock(),
        200,
    )
    .await
    .unwrap();

    let mut settings = fast_settings();
    settings.goal_override = goal_override;

    Runner::new(
        Collaborators::from_backend(store.clone(), store),
        Arc::new(MockGenerator::new()),
        Arc::new(credentials),
        Arc::new(ScriptedLauncher::default()),
        settings,
    )
}

#[tokio::test]
async fn test_sqlite_run_records_everything() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir, 3).await;

    let summary = runner_for(store.clone(), None).await.run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::GoalReached);
    assert_eq!(summary.succeeded, 6);
    assert_eq!(store.consumed_count().unwrap(), 6);

    let records = store.fetch_today().await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.success_count == 3));

    let published = store.published_for("writer1").unwrap();
    assert_eq!(published.len(), 3);
    assert!(published
        .iter()
        .all(|p| p.published_url.starts_with("https://blog1.example/?p=")));
}

#[tokio::test]
async fn test_second_run_same_day_resumes_from_store() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir, 4).await;

    let first = runner_for(store.clone(), Some(2)).await.run().await.unwrap();
    assert_eq!(first.succeeded, 4);

    let second = runner_for(store.clone(), None).await.run().await.unwrap();
    assert_eq!(second.target.global_goal, 4);
    assert_eq!(second.succeeded, 4);
    assert_eq!(store.consumed_count().unwrap(), 8);

    let third = runner_for(store.clone(), None).await.run().await.unwrap();
    assert_eq!(third.stop_reason, StopReason::GoalReached);
    assert_eq!(third.sessions_started, 0);
}
