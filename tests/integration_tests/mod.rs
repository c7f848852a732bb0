//! Integration tests module
//!
//! End-to-end runs of the orchestrator with a scripted browser, a mock
//! generator and in-memory or SQLite collaborators.

pub mod dry_run_test;
pub mod failure_scenarios;
pub mod fixtures;
pub mod run_scenarios;
pub mod sqlite_run_test;
