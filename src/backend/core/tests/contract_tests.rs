//! Journal contract tests.
//!
//! The in-process backend runs on every `cargo test`. The PostgreSQL and
//! MongoDB runs need a live database and are `#[ignore]`d; point
//! `JOURNAL_TEST_POSTGRES_URL` / `JOURNAL_TEST_MONGO_URL` at one (a `.env`
//! file works) and run `cargo test -- --ignored`.

mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use journal_core::config::{DatabaseConfig, Driver};
use journal_core::error::ErrorCode;
use journal_core::journal::{AppendRequest, CallContext, FixedClock, Journal, NewEvent};
use journal_core::storage::{self, MemoryBackend, StorageBackend};

fn database_config(driver: Driver, env: &str) -> Option<DatabaseConfig> {
    dotenvy::dotenv().ok();
    let url = std::env::var(env).ok()?;
    let mut config = DatabaseConfig::memory();
    config.driver = driver;
    config.url = Some(url);
    config.name = "eventstore_test".to_string();
    config.max_connections = 16;
    Some(config)
}

// ============================================================================
// In-process backend
// ============================================================================

#[tokio::test]
async fn test_memory_backend_contract() {
    common::run_contract(Arc::new(MemoryBackend::new())).await;
}

#[tokio::test]
async fn test_connect_selects_memory_driver() {
    let backend = storage::connect(&DatabaseConfig::memory()).await.unwrap();
    assert_eq!(backend.name(), "memory");
    backend.ping().await.unwrap();
}

#[tokio::test]
async fn test_connect_without_url_is_configuration_error() {
    let mut config = DatabaseConfig::memory();
    config.driver = Driver::Postgres;

    let err = storage::connect(&config).await.err().unwrap();
    assert_eq!(err.code(), ErrorCode::ConfigurationError);
}

#[tokio::test]
async fn test_timestamps_come_from_clock() {
    let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 15, 2).unwrap()
        + chrono::Duration::nanoseconds(123_456_789);
    let journal = Journal::with_clock(Arc::new(MemoryBackend::new()), Arc::new(FixedClock(at)));
    let ctx = CallContext::background();

    journal
        .append(&ctx, AppendRequest::new("clocked", 0, NewEvent::new("k")))
        .await
        .unwrap();

    let events = journal.get_stream_events(&ctx, "clocked").await.unwrap();
    assert_eq!(events[0].timestamp(), "2026-10-19T08:15:02.123456Z");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_contract_multi_thread() {
    let journal = Journal::new(Arc::new(MemoryBackend::new()));
    common::concurrent_appends_have_one_winner(&journal).await;
    common::concurrent_creates_have_one_winner(&journal).await;
    common::distinct_streams_are_independent(&journal).await;
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires JOURNAL_TEST_POSTGRES_URL"]
async fn test_postgres_backend_contract() {
    let Some(config) = database_config(Driver::Postgres, "JOURNAL_TEST_POSTGRES_URL") else {
        eprintln!("JOURNAL_TEST_POSTGRES_URL not set; skipping");
        return;
    };
    let backend = storage::connect(&config).await.unwrap();
    assert_eq!(backend.name(), "postgres");
    common::run_contract(backend).await;
}

#[tokio::test]
#[ignore = "requires JOURNAL_TEST_POSTGRES_URL"]
async fn test_postgres_schema_is_idempotent() {
    let Some(config) = database_config(Driver::Postgres, "JOURNAL_TEST_POSTGRES_URL") else {
        return;
    };
    let backend = journal_core::storage::PostgresBackend::connect(&config).await.unwrap();
    backend.ensure_schema().await.unwrap();
    backend.ensure_schema().await.unwrap();
}

#[tokio::test]
#[ignore = "requires JOURNAL_TEST_POSTGRES_URL"]
async fn test_postgres_conflict_reports_actual_version() {
    let Some(config) = database_config(Driver::Postgres, "JOURNAL_TEST_POSTGRES_URL") else {
        return;
    };
    let journal = Journal::new(storage::connect(&config).await.unwrap());
    let stream = common::unique_stream("pg-actual");
    common::append(&journal, &stream, 0, "a").await.unwrap();
    common::append(&journal, &stream, 1, "b").await.unwrap();

    let err = common::append(&journal, &stream, 1, "c").await.unwrap_err();
    assert_eq!(err.details().actual_version, Some(2));
}

// ============================================================================
// MongoDB
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires JOURNAL_TEST_MONGO_URL (replica set)"]
async fn test_mongo_backend_contract() {
    let Some(config) = database_config(Driver::Mongodb, "JOURNAL_TEST_MONGO_URL") else {
        eprintln!("JOURNAL_TEST_MONGO_URL not set; skipping");
        return;
    };
    let backend: Arc<dyn StorageBackend> = storage::connect(&config).await.unwrap();
    assert_eq!(backend.name(), "mongodb");
    common::run_contract(backend).await;
}
