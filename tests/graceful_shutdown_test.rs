//! Integration tests for graceful shutdown
//!
//! These tests verify that:
//! - No new form is dispatched once shutdown is requested
//! - Watermarks confirmed before the signal stay committed
//! - Parent watermarks are left alone by an interrupted run
//! - A rerun resumes where the interrupted run stopped

mod common;

use common::*;
use harvest::adapters::memory::MemoryStore;
use harvest::cli::commands::sync::exit_code;
use harvest::core::cascade::{LevelState, RunStatus};
use harvest::domain::WriteDisposition;
use std::sync::Arc;
use tokio::sync::watch;

async fn three_forms(stub: &Arc<KoboStub>) {
    for (index, uid) in ["f1", "f2", "f3"].iter().enumerate() {
        let id = index as i64 + 1;
        stub.add_form(uid).await;
        stub.add_submissions(uid, vec![submission(id, at(id * 10))]).await;
    }
}

#[tokio::test]
async fn test_interrupt_keeps_confirmed_watermarks() {
    let stub = KoboStub::new();
    let store = Arc::new(MemoryStore::new());
    three_forms(&stub).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    stub.trip_after(1, shutdown_tx).await;

    let summary = sync_into(
        &stub,
        &store,
        store.clone(),
        &plan(&sync_config(WriteDisposition::Merge)),
        sequential(),
        Some(shutdown_rx),
    )
    .await;

    assert_eq!(summary.status(), RunStatus::Interrupted);
    assert_eq!(exit_code(&summary), 130);

    let level = summary.level("kobo_submission").unwrap();
    assert_eq!(level.state, LevelState::Interrupted);
    assert_eq!(level.parents_total, 3);
    assert_eq!(level.parents_processed, 1);

    assert_eq!(stored_ids(&store, "kobo_submission").await, vec![1]);
    assert_eq!(
        store.watermark(&submission_key("f1")).await.unwrap().value,
        at(10)
    );
    assert!(store.watermark(&submission_key("f2")).await.is_none());
    assert!(store.watermark(&form_key()).await.is_none());

    let runs = store.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Interrupted);
}

#[tokio::test]
async fn test_rerun_after_interrupt_resumes() {
    let stub = KoboStub::new();
    let store = Arc::new(MemoryStore::new());
    three_forms(&stub).await;
    let plan = plan(&sync_config(WriteDisposition::Merge));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    stub.trip_after(1, shutdown_tx).await;
    sync_into(&stub, &store, store.clone(), &plan, sequential(), Some(shutdown_rx)).await;

    let summary = sync(&stub, &store, &plan, sequential()).await;

    assert!(summary.is_successful());
    assert_eq!(stored_ids(&store, "kobo_submission").await, vec![1, 2, 3]);
    assert_eq!(
        store.watermark(&submission_key("f3")).await.unwrap().value,
        at(30)
    );
    assert_eq!(store.watermark(&form_key()).await.unwrap().value, at(30));
}

#[tokio::test]
async fn test_shutdown_before_start_requests_nothing() {
    let stub = KoboStub::new();
    let store = Arc::new(MemoryStore::new());
    three_forms(&stub).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    let summary = sync_into(
        &stub,
        &store,
        store.clone(),
        &plan(&sync_config(WriteDisposition::Merge)),
        sequential(),
        Some(shutdown_rx),
    )
    .await;

    assert!(summary.interrupted);
    assert!(stub.requests().await.is_empty());
    assert!(summary
        .levels
        .iter()
        .all(|level| level.state == LevelState::NotStarted));
    assert_eq!(summary.total_rows_written(), 0);
}
