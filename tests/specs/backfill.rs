//! Scenario: reconnect backfill from a cursor.

use crate::prelude::*;
use amelia_core::{EventId, EventType, WorkflowId, WorkflowStatus};

/// Run a workflow to completion so its stream has a known shape.
async fn completed_run(spec: &Spec) -> String {
    spec.driver.push_result(&plan_json());
    spec.driver.push_result("made the changes");
    spec.driver.push_result(&verdict_json(true, None));

    let id = spec.create_workflow("TASK-1", "w", "Add button").await;
    spec.wait_for_status(&id, WorkflowStatus::Blocked).await;
    spec.request("POST", &format!("/api/workflows/{id}/approve"), None)
        .await;
    spec.wait_for_status(&id, WorkflowStatus::Completed).await;
    spec.wait_for_final_event(&id, EventType::WorkflowCompleted)
        .await;
    id
}

#[tokio::test]
async fn cursor_replay_returns_later_events_in_order() {
    let spec = Spec::new();
    let id = completed_run(&spec).await;

    let events = spec.events_of(&id);
    let total = events.len() as u64;
    assert!(total >= 10, "expected a rich stream, got {total}");
    let cursor = events[2].id.clone(); // sequence 3

    let store = spec.events.lock();
    let replay = store.list_after(&cursor, 1000).unwrap();
    drop(store);

    assert_eq!(replay.len() as u64, total - 3);
    let sequences: Vec<u64> = replay.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (4..=total).collect::<Vec<u64>>());

    // No duplicates across the boundary
    assert!(replay.iter().all(|e| e.sequence > 3));
}

#[tokio::test]
async fn cursor_resolution_pins_the_workflow() {
    let spec = Spec::new();
    let id = completed_run(&spec).await;

    let cursor = spec.events_of(&id)[0].id.clone();
    let (workflow_id, sequence) = spec.events.lock().resolve_cursor(&cursor).unwrap();
    assert_eq!(workflow_id, WorkflowId::new(id));
    assert_eq!(sequence, 1);
}

#[tokio::test]
async fn replay_respects_the_backfill_cap() {
    let spec = Spec::new();
    let id = completed_run(&spec).await;

    let cursor = spec.events_of(&id)[0].id.clone();
    let replay = spec.events.lock().list_after(&cursor, 3).unwrap();
    assert_eq!(replay.len(), 3);
    assert_eq!(replay[0].sequence, 2);
}

#[tokio::test]
async fn purged_cursor_reports_backfill_expired() {
    let spec = Spec::new();
    let id = completed_run(&spec).await;
    let cursor = spec.events_of(&id)[2].id.clone();

    // Retention wipes the stream
    let future = chrono::Utc::now() + chrono::Duration::days(365);
    spec.events
        .lock()
        .purge_older_than(future, None, amelia_storage::PurgeScope::All)
        .unwrap();

    let err = spec.events.lock().list_after(&cursor, 1000).unwrap_err();
    assert!(matches!(
        err,
        amelia_storage::EventStoreError::CursorNotFound(_)
    ));
}

#[tokio::test]
async fn unknown_cursor_reports_not_found_without_events() {
    let spec = Spec::new();
    completed_run(&spec).await;

    let err = spec
        .events
        .lock()
        .list_after(&EventId::new("evt-never-existed"), 1000)
        .unwrap_err();
    assert!(matches!(
        err,
        amelia_storage::EventStoreError::CursorNotFound(_)
    ));
}
