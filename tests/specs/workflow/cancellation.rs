//! Scenario: cancellation mid-run releases the worktree.

use crate::prelude::*;
use amelia_core::{EventType, WorkflowStatus};
use axum::http::StatusCode;

#[tokio::test]
async fn cancel_during_execution_terminates_within_bounded_time() {
    let spec = Spec::new();
    spec.driver.push_result(&plan_json());

    let id = spec.create_workflow("TASK-1", "w", "Add button").await;
    spec.wait_for_status(&id, WorkflowStatus::Blocked).await;

    // Developer hangs until cancelled
    spec.driver.set_hang(true);
    spec.request("POST", &format!("/api/workflows/{id}/approve"), None)
        .await;
    spec.wait_for_status(&id, WorkflowStatus::InProgress).await;

    let started = std::time::Instant::now();
    let (status, _) = spec
        .request("POST", &format!("/api/workflows/{id}/cancel"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    spec.wait_for_status(&id, WorkflowStatus::Cancelled).await;
    spec.wait_for_final_event(&id, EventType::WorkflowCancelled)
        .await;
    assert!(started.elapsed() < std::time::Duration::from_secs(2));

    // The worktree is released: a new workflow is admitted
    spec.driver.set_hang(false);
    spec.driver.push_result(&plan_json());
    let (status, _) = spec
        .request(
            "POST",
            "/api/workflows",
            Some(serde_json::json!({
                "issue_id": "TASK-2",
                "worktree_path": spec.worktree("w"),
                "task_title": "Next task",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn cancel_on_a_cancelled_workflow_is_idempotent() {
    let spec = Spec::new();
    spec.driver.push_result(&plan_json());

    let id = spec.create_workflow("TASK-1", "w", "Add button").await;
    spec.wait_for_status(&id, WorkflowStatus::Blocked).await;

    spec.request("POST", &format!("/api/workflows/{id}/cancel"), None)
        .await;
    spec.wait_for_status(&id, WorkflowStatus::Cancelled).await;

    let (status, body) = spec
        .request("POST", &format!("/api/workflows/{id}/cancel"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("already"));
}
