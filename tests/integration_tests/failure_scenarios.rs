//! Failure, quota and cancellation scenarios
//!
//! Per-keyword failures must stay inside their task, leave the keyword
//! unconsumed and never stop sibling work; only quota exhaustion and an
//! explicit stop end the run early.

use std::sync::atomic::Ordering;
use std::time::Duration;

use autopost::generator::MockGenerator;
use autopost::models::StopReason;
use autopost::session::{EditorSelectors, ScriptedBehavior};

use super::fixtures::{sample_credentials, Harness};

async fn harness_with(
    keywords: usize,
    goal: u32,
    generator: MockGenerator,
    behavior: ScriptedBehavior,
) -> Harness {
    Harness::with_parts(1, keywords, Some(goal), generator, behavior, sample_credentials(1), 200).await
}

// ============================================================================
// Quota and Rate Limits
// ============================================================================

#[tokio::test]
async fn test_quota_exhaustion_halts_run() {
    let mut harness = Harness::with_parts(
        1,
        10,
        Some(5),
        MockGenerator::new(),
        ScriptedBehavior::default(),
        sample_credentials(1),
        2,
    )
    .await;
    harness.settings.keyword_concurrency = 1;

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::QuotaExhausted);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 3);
    assert_eq!(harness.generator.calls().len(), 2);
    assert_eq!(harness.store.consumed().len(), 2);
    assert_eq!(harness.usage.get("GEMINI_API_KEY1").unwrap().count, 2);
    // Progress counted before the halt is still flushed
    assert_eq!(harness.store.today_count("writer1"), 2);
}

#[tokio::test]
async fn test_quota_moves_to_next_credential() {
    let harness = Harness::with_parts(
        1,
        10,
        Some(3),
        MockGenerator::new(),
        ScriptedBehavior::default(),
        sample_credentials(2),
        2,
    )
    .await;

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.succeeded, 3);
    assert_eq!(harness.usage.get("GEMINI_API_KEY1").unwrap().count, 2);
    assert_eq!(harness.usage.get("GEMINI_API_KEY2").unwrap().count, 1);
}

#[tokio::test]
async fn test_rate_limited_generation_is_retried() {
    let harness = harness_with(
        1,
        1,
        MockGenerator::new().rate_limit("keyword-01", 2),
        ScriptedBehavior::default(),
    )
    .await;

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(harness.generator.calls().len(), 3);
    // Every attempt is a generation call and counts against the quota
    assert_eq!(harness.usage.get("GEMINI_API_KEY1").unwrap().count, 3);
    assert_eq!(harness.store.consumed(), vec!["keyword-01".to_string()]);
}

#[tokio::test]
async fn test_persistent_rate_limit_gives_up_on_keyword() {
    let harness = harness_with(
        2,
        1,
        MockGenerator::new().rate_limit("keyword-01", 6),
        ScriptedBehavior::default(),
    )
    .await;

    let summary = harness.runner().run().await.unwrap();

    let calls = harness.generator.calls();
    assert_eq!(calls.iter().filter(|(k, _)| k == "keyword-01").count(), 6);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(harness.store.consumed(), vec!["keyword-02".to_string()]);
}

// ============================================================================
// Per-keyword Failures
// ============================================================================

#[tokio::test]
async fn test_incomplete_content_skipped_after_attempt_cap() {
    let harness = harness_with(
        4,
        3,
        MockGenerator::new().untitled("keyword-01"),
        ScriptedBehavior::default(),
    )
    .await;

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::GoalReached);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 2);
    // Generation failed before any page was opened
    assert_eq!(summary.sessions_started, 3);

    let mut consumed = harness.store.consumed();
    consumed.sort();
    assert_eq!(consumed, vec!["keyword-02", "keyword-03", "keyword-04"]);
    let untitled_calls = harness
        .generator
        .calls()
        .iter()
        .filter(|(k, _)| k == "keyword-01")
        .count();
    assert_eq!(untitled_calls, 2);
}

#[tokio::test]
async fn test_body_emptied_by_filtering_is_not_published() {
    let harness = harness_with(
        3,
        2,
        MockGenerator::new().notes_only("keyword-01"),
        ScriptedBehavior::default(),
    )
    .await;

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::GoalReached);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.sessions_started, 2);
    assert!(!harness.store.consumed().contains(&"keyword-01".to_string()));
    assert!(harness
        .store
        .published()
        .iter()
        .all(|p| p.keyword != "keyword-01"));
    assert_eq!(harness.launcher.stats().pages_opened.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_blank_published_url_leaves_keyword_unconsumed() {
    let harness = harness_with(
        3,
        2,
        MockGenerator::new(),
        ScriptedBehavior::default().blank_url_for("keyword-01 완벽 가이드"),
    )
    .await;

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 2);
    assert!(!harness.store.consumed().contains(&"keyword-01".to_string()));
    assert!(harness
        .store
        .published()
        .iter()
        .all(|p| p.keyword != "keyword-01"));
}

#[tokio::test]
async fn test_rejected_login_fails_every_session() {
    let harness = harness_with(
        2,
        2,
        MockGenerator::new(),
        ScriptedBehavior::default().rejecting_login(),
    )
    .await;

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::KeywordsExhausted);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 4);
    assert_eq!(summary.sessions_started, 4);
    assert!(harness.store.consumed().is_empty());
    assert_eq!(harness.store.today_count("writer1"), 0);
}

#[tokio::test]
async fn test_missing_publish_button_aborts_session() {
    let selectors = EditorSelectors::default();
    let harness = harness_with(
        1,
        1,
        MockGenerator::new(),
        ScriptedBehavior::default().missing(selectors.publish_confirm.clone()),
    )
    .await;

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 2);
    assert!(harness.store.consumed().is_empty());
    assert!(harness.store.published().is_empty());
}

// ============================================================================
// Progress Store Failures
// ============================================================================

#[tokio::test]
async fn test_failed_final_flush_reports_pending() {
    let harness = harness_with(5, 2, MockGenerator::new(), ScriptedBehavior::default()).await;
    harness.store.fail_upserts(true);

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::GoalReached);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.flushed, 0);
    assert_eq!(summary.pending_unflushed, 2);
    assert_eq!(harness.store.today_count("writer1"), 0);
    assert_eq!(harness.store.upsert_calls().len(), 1);
}

#[tokio::test]
async fn test_unreadable_progress_store_fails_run() {
    let harness = harness_with(5, 2, MockGenerator::new(), ScriptedBehavior::default()).await;
    harness.store.fail_fetch_today(true);

    assert!(harness.runner().run().await.is_err());
    assert_eq!(harness.launcher.stats().launched.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_stop_aborts_in_flight_sessions() {
    let harness = harness_with(
        10,
        5,
        MockGenerator::new(),
        ScriptedBehavior::default().with_delay(Duration::from_millis(100)),
    )
    .await;

    let handle = harness.runner().start();
    tokio::time::sleep(Duration::from_millis(150)).await;
    handle.stop();
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert_eq!(summary.succeeded, 0);
    assert!(harness.store.consumed().is_empty());

    let stats = harness.launcher.stats();
    assert_eq!(stats.launched.load(Ordering::SeqCst), 1);
    assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_keeps_progress_already_counted() {
    let mut harness = harness_with(
        10,
        10,
        MockGenerator::new(),
        ScriptedBehavior::default().with_delay(Duration::from_millis(10)),
    )
    .await;
    harness.settings.keyword_concurrency = 1;

    let handle = harness.runner().start();
    // A session takes roughly 100ms here; let a few finish
    tokio::time::sleep(Duration::from_millis(350)).await;
    handle.stop();
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert!(summary.succeeded < 10);
    assert_eq!(
        harness.store.today_count("writer1") as u64,
        summary.succeeded
    );
    assert_eq!(harness.store.consumed().len() as u64, summary.succeeded);
}
