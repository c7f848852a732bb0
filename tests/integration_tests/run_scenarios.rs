//! Full run scenarios
//!
//! Tests the complete workflow:
//! 1. Goal and remaining computation
//! 2. Two-tier dispatch of accounts and keywords
//! 3. Generation, publishing and consumption
//! 4. Batched progress and the final flush

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::time::Duration;

use autopost::generator::MockGenerator;
use autopost::models::{ProgressDelta, StopReason};
use autopost::session::ScriptedBehavior;

use super::fixtures::{sample_credentials, Harness};

// ============================================================================
// Goal Tracking
// ============================================================================

#[tokio::test]
async fn test_two_accounts_reach_goal() {
    let harness = Harness::new(2, 10, Some(4)).await;

    let summary = harness.runner().run().await.unwrap();

    let consumed = harness.store.consumed();
    assert_eq!(consumed.len(), 8);
    assert_eq!(harness.store.today_count("writer1"), 4);
    assert_eq!(harness.store.today_count("writer2"), 4);

    assert_eq!(summary.stop_reason, StopReason::GoalReached);
    assert_eq!(summary.target.per_account_goal, 4);
    assert_eq!(summary.target.global_goal, 8);
    assert_eq!(summary.sessions_started, 8);
    assert_eq!(summary.succeeded, 8);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.flushed, 8);
    assert_eq!(summary.pending_unflushed, 0);

    // Below the threshold: only the final flush writes, once
    assert_eq!(
        harness.store.upsert_calls(),
        vec![vec![ProgressDelta::new("writer1", 4), ProgressDelta::new("writer2", 4)]]
    );

    let stats = harness.launcher.stats();
    assert_eq!(stats.launched.load(Ordering::SeqCst), 2);
    assert_eq!(stats.closed.load(Ordering::SeqCst), 2);
    assert_eq!(stats.pages_opened.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_accounts_already_at_goal_start_no_sessions() {
    let harness = Harness::new(2, 10, Some(4)).await;
    harness.store.set_today_count("writer1", 4);
    harness.store.set_today_count("writer2", 6);

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::GoalReached);
    assert_eq!(summary.sessions_started, 0);
    assert_eq!(summary.target.global_goal, 0);
    assert!(harness.generator.calls().is_empty());
    assert_eq!(harness.launcher.stats().launched.load(Ordering::SeqCst), 0);
    assert!(harness.store.consumed().is_empty());
}

#[tokio::test]
async fn test_partial_progress_only_fills_the_gap() {
    let harness = Harness::new(2, 10, Some(4)).await;
    harness.store.set_today_count("writer1", 3);

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.target.global_goal, 5);
    assert_eq!(summary.succeeded, 5);
    assert_eq!(harness.store.today_count("writer1"), 4);
    assert_eq!(harness.store.today_count("writer2"), 4);
}

#[tokio::test]
async fn test_no_accounts_is_nothing_to_do() {
    let harness = Harness::new(0, 5, Some(4)).await;

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::NothingToDo);
    assert_eq!(summary.sessions_started, 0);
}

#[tokio::test]
async fn test_keywords_exhausted_before_goal() {
    let harness = Harness::new(2, 3, Some(4)).await;

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::KeywordsExhausted);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(harness.store.consumed().len(), 3);
    assert_eq!(
        harness.store.today_count("writer1") + harness.store.today_count("writer2"),
        3
    );
}

// ============================================================================
// Consumption and Audit
// ============================================================================

#[tokio::test]
async fn test_each_keyword_consumed_and_logged_once() {
    let mut harness = Harness::new(3, 12, Some(3)).await;
    harness.settings.keyword_concurrency = 3;

    harness.runner().run().await.unwrap();

    let consume_calls = harness.store.consume_calls();
    let unique: HashSet<&String> = consume_calls.iter().collect();
    assert_eq!(consume_calls.len(), 9);
    assert_eq!(unique.len(), 9);

    let published = harness.store.published();
    let keywords: HashSet<&str> = published.iter().map(|p| p.keyword.as_str()).collect();
    assert_eq!(published.len(), 9);
    assert_eq!(keywords.len(), 9);

    let urls: HashSet<&str> = published.iter().map(|p| p.published_url.as_str()).collect();
    assert_eq!(urls.len(), 9);
    for result in &published {
        assert!(result.title.ends_with("완벽 가이드"));
        assert!(result.published_url.contains("/?p="));
    }
}

#[tokio::test]
async fn test_published_urls_belong_to_account_site() {
    let harness = Harness::new(2, 4, Some(2)).await;

    harness.runner().run().await.unwrap();

    for result in harness.store.published() {
        let site = match result.account.as_str() {
            "writer1" => "https://blog1.example",
            "writer2" => "https://blog2.example",
            other => panic!("unexpected account {other}"),
        };
        assert!(result.published_url.starts_with(site));
    }
}

// ============================================================================
// Goal Sources
// ============================================================================

#[tokio::test]
async fn test_goal_falls_back_to_default() {
    let mut harness = Harness::new(1, 10, Some(8)).await;
    harness.store.fail_settings(true);
    harness.settings.default_goal = 2;

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.target.per_account_goal, 2);
    assert_eq!(harness.store.consumed().len(), 2);
}

#[tokio::test]
async fn test_missing_goal_uses_default() {
    let mut harness = Harness::new(1, 10, None).await;
    harness.settings.default_goal = 3;

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.target.per_account_goal, 3);
    assert_eq!(summary.succeeded, 3);
}

#[tokio::test]
async fn test_goal_override_wins() {
    let mut harness = Harness::new(1, 10, Some(8)).await;
    harness.settings.goal_override = Some(1);

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.target.per_account_goal, 1);
    assert_eq!(harness.store.consumed().len(), 1);
}

// ============================================================================
// Progress Batching
// ============================================================================

#[tokio::test]
async fn test_progress_flushed_in_batches() {
    let mut harness = Harness::new(1, 10, Some(7)).await;
    harness.settings.flush_threshold = 3;
    harness.settings.keyword_concurrency = 1;

    let summary = harness.runner().run().await.unwrap();

    let calls = harness.store.upsert_calls();
    let total: u32 = calls.iter().flatten().map(|d| d.delta).sum();
    assert_eq!(total, 7);
    assert_eq!(
        calls,
        vec![
            vec![ProgressDelta::new("writer1", 3)],
            vec![ProgressDelta::new("writer1", 3)],
            vec![ProgressDelta::new("writer1", 1)],
        ]
    );
    assert_eq!(harness.store.today_count("writer1"), 7);
    assert_eq!(summary.flushed, 7);
}

// ============================================================================
// Browser Usage
// ============================================================================

#[tokio::test]
async fn test_login_once_per_browser() {
    let harness = Harness::with_parts(
        1,
        5,
        Some(3),
        MockGenerator::new(),
        ScriptedBehavior::default().requires_login(),
        sample_credentials(1),
        200,
    )
    .await;

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_keyword_concurrency_bounds_open_pages() {
    let mut harness = Harness::with_parts(
        1,
        10,
        Some(6),
        MockGenerator::new(),
        ScriptedBehavior::default().with_delay(Duration::from_millis(2)),
        sample_credentials(1),
        200,
    )
    .await;
    harness.settings.keyword_concurrency = 2;

    let summary = harness.runner().run().await.unwrap();

    assert_eq!(summary.succeeded, 6);
    let peak = harness
        .launcher
        .stats()
        .max_pages_per_browser
        .load(Ordering::SeqCst);
    assert!(peak <= 2, "peak open pages {peak}");
}
