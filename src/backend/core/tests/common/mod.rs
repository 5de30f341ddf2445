//! Shared journal contract suite.
//!
//! Every backend must pass `run_contract`. Stream ids are prefixed with a
//! fresh UUID so the suite can run repeatedly against a persistent database.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use journal_core::error::ErrorCode;
use journal_core::journal::{AppendRequest, CallContext, Journal, NewEvent};
use journal_core::storage::StorageBackend;
use uuid::Uuid;

pub fn unique_stream(name: &str) -> String {
    format!("{}-{}", name, Uuid::new_v4())
}

pub fn event(kind: &str, payload: &[u8]) -> NewEvent {
    NewEvent::new(kind)
        .with_encoding("application/octet-stream")
        .with_source("contract-suite")
        .with_payload(payload.to_vec())
}

pub async fn append(journal: &Journal, stream: &str, expected: i64, kind: &str) -> journal_core::Result<i64> {
    journal
        .append(
            &CallContext::background(),
            AppendRequest::new(stream, expected, event(kind, kind.as_bytes())),
        )
        .await
}

/// Run every contract check against `backend`.
pub async fn run_contract(backend: Arc<dyn StorageBackend>) {
    let journal = Journal::new(backend);

    first_append_creates_stream(&journal).await;
    sequential_appends_are_contiguous(&journal).await;
    create_existing_stream_conflicts(&journal).await;
    advance_missing_stream_conflicts(&journal).await;
    concurrent_appends_have_one_winner(&journal).await;
    concurrent_creates_have_one_winner(&journal).await;
    unknown_stream_reads_empty(&journal).await;
    fields_round_trip(&journal).await;
    conflict_scenario(&journal).await;
    invalid_arguments_rejected(&journal).await;
    cancelled_append_leaves_no_orphan(&journal).await;
    distinct_streams_are_independent(&journal).await;
}

pub async fn first_append_creates_stream(journal: &Journal) {
    let stream = unique_stream("first");
    assert_eq!(append(journal, &stream, 0, "created").await.unwrap(), 1);
}

pub async fn sequential_appends_are_contiguous(journal: &Journal) {
    let stream = unique_stream("sequential");
    for expected in 0..5 {
        let version = append(journal, &stream, expected, "tick").await.unwrap();
        assert_eq!(version, expected + 1);
    }

    let events = journal
        .get_stream_events(&CallContext::background(), &stream)
        .await
        .unwrap();
    let versions: Vec<i64> = events.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
}

pub async fn create_existing_stream_conflicts(journal: &Journal) {
    let stream = unique_stream("recreate");
    append(journal, &stream, 0, "a").await.unwrap();

    let err = append(journal, &stream, 0, "b").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::VersionConflict);
    assert_eq!(err.details().stream_id.as_deref(), Some(stream.as_str()));
    assert_eq!(err.details().expected_version, Some(0));
}

pub async fn advance_missing_stream_conflicts(journal: &Journal) {
    let stream = unique_stream("missing");
    let err = append(journal, &stream, 3, "a").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::VersionConflict);

    let events = journal
        .get_stream_events(&CallContext::background(), &stream)
        .await
        .unwrap();
    assert!(events.is_empty());
}

pub async fn concurrent_appends_have_one_winner(journal: &Journal) {
    let stream = unique_stream("race");
    append(journal, &stream, 0, "seed").await.unwrap();

    let contenders = 8;
    let barrier = Arc::new(tokio::sync::Barrier::new(contenders));
    let mut handles = Vec::with_capacity(contenders);
    for i in 0..contenders {
        let journal = journal.clone();
        let stream = stream.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            append(&journal, &stream, 1, &format!("contender-{}", i)).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(version) => {
                assert_eq!(version, 2);
                winners += 1;
            }
            Err(err) => assert_eq!(err.code(), ErrorCode::VersionConflict),
        }
    }
    assert_eq!(winners, 1);

    let events = journal
        .get_stream_events(&CallContext::background(), &stream)
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
}

pub async fn concurrent_creates_have_one_winner(journal: &Journal) {
    let stream = unique_stream("create-race");

    let contenders = 8;
    let barrier = Arc::new(tokio::sync::Barrier::new(contenders));
    let mut handles = Vec::with_capacity(contenders);
    for i in 0..contenders {
        let journal = journal.clone();
        let stream = stream.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            append(&journal, &stream, 0, &format!("creator-{}", i)).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(version) => {
                assert_eq!(version, 1);
                winners += 1;
            }
            Err(err) => {
                assert_eq!(err.code(), ErrorCode::VersionConflict);
                assert_eq!(err.details().stream_id.as_deref(), Some(stream.as_str()));
                assert_eq!(err.details().expected_version, Some(0));
            }
        }
    }
    assert_eq!(winners, 1);

    let events = journal
        .get_stream_events(&CallContext::background(), &stream)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].version, 1);
}

pub async fn unknown_stream_reads_empty(journal: &Journal) {
    let events = journal
        .get_stream_events(&CallContext::background(), &unique_stream("never"))
        .await
        .unwrap();
    assert!(events.is_empty());
}

pub async fn fields_round_trip(journal: &Journal) {
    let stream = unique_stream("roundtrip");
    let payload = vec![0_u8, 255, 1, 128, b'{', b'}'];
    let new_event = NewEvent::new("OrderPlaced")
        .with_encoding("application/x-custom")
        .with_source("checkout")
        .with_payload(payload.clone());

    journal
        .append(&CallContext::background(), AppendRequest::new(stream.as_str(), 0, new_event))
        .await
        .unwrap();

    let events = journal
        .get_stream_events(&CallContext::background(), &stream)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);

    let recorded = &events[0];
    assert_eq!(recorded.stream_id, stream);
    assert_eq!(recorded.version, 1);
    assert_eq!(recorded.kind, "OrderPlaced");
    assert_eq!(recorded.encoding, "application/x-custom");
    assert_eq!(recorded.source, "checkout");
    assert_eq!(recorded.payload, payload);
    assert!(recorded.id.as_deref().map_or(false, |id| !id.is_empty()));
    assert_eq!(recorded.timestamp().len(), "2026-10-19T08:15:02.123456Z".len());
}

pub async fn conflict_scenario(journal: &Journal) {
    let stream = unique_stream("s1");
    assert_eq!(append(journal, &stream, 0, "k1").await.unwrap(), 1);
    assert_eq!(append(journal, &stream, 1, "k2").await.unwrap(), 2);

    let err = append(journal, &stream, 1, "k3").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::VersionConflict);
    assert_eq!(err.details().expected_version, Some(1));
    if let Some(actual) = err.details().actual_version {
        assert_eq!(actual, 2);
    }

    let events = journal
        .get_stream_events(&CallContext::background(), &stream)
        .await
        .unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, vec!["k1", "k2"]);
}

pub async fn invalid_arguments_rejected(journal: &Journal) {
    let err = append(journal, "", 0, "k").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    let err = append(journal, &unique_stream("negative"), -1, "k").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    let err = journal
        .get_stream_events(&CallContext::background(), "")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

pub async fn cancelled_append_leaves_no_orphan(journal: &Journal) {
    let stream = unique_stream("cancelled");
    append(journal, &stream, 0, "a").await.unwrap();

    let ctx = CallContext::background();
    ctx.cancel();
    let err = journal
        .append(&ctx, AppendRequest::new(stream.as_str(), 1, event("b", b"b")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Cancelled);

    // A deadline that expires mid-flight either commits or leaves nothing.
    let ctx = CallContext::with_timeout(Duration::from_nanos(1));
    let _ = journal
        .append(&ctx, AppendRequest::new(stream.as_str(), 1, event("c", b"c")))
        .await;

    let events = journal
        .get_stream_events(&CallContext::background(), &stream)
        .await
        .unwrap();
    let versions: Vec<i64> = events.iter().map(|e| e.version).collect();
    let expected: Vec<i64> = (1..=events.len() as i64).collect();
    assert_eq!(versions, expected);

    let next = events.len() as i64;
    assert_eq!(append(journal, &stream, next, "d").await.unwrap(), next + 1);
}

pub async fn distinct_streams_are_independent(journal: &Journal) {
    let a = unique_stream("a");
    let b = unique_stream("b");

    let (va, vb) = tokio::join!(append(journal, &a, 0, "x"), append(journal, &b, 0, "y"));
    assert_eq!(va.unwrap(), 1);
    assert_eq!(vb.unwrap(), 1);
    assert_eq!(append(journal, &a, 1, "x").await.unwrap(), 2);

    let events = journal
        .get_stream_events(&CallContext::background(), &b)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}
