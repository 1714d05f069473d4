//! Scenario: plan rejection is terminal.

use crate::prelude::*;
use amelia_core::{AgentRole, EventType, WorkflowStatus};
use axum::http::StatusCode;

#[tokio::test]
async fn reject_fails_the_workflow_with_the_feedback() {
    let spec = Spec::new();
    spec.driver.push_result(&plan_json());

    let id = spec.create_workflow("TASK-1", "w", "Add button").await;
    spec.wait_for_status(&id, WorkflowStatus::Blocked).await;

    let (status, body) = spec
        .request(
            "POST",
            &format!("/api/workflows/{id}/reject"),
            Some(serde_json::json!({"feedback": "plan is wrong"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");

    spec.wait_for_final_event(&id, EventType::WorkflowFailed)
        .await;

    let row = spec
        .state
        .orchestrator
        .workflow(&amelia_core::WorkflowId::new(id.clone()))
        .unwrap();
    assert_eq!(row.status, WorkflowStatus::Failed);
    assert_eq!(row.failure_reason.as_deref(), Some("plan is wrong"));

    // No developer or reviewer activity ever happened
    let events = spec.events_of(&id);
    assert!(!events
        .iter()
        .any(|e| e.agent == AgentRole::Developer || e.agent == AgentRole::Reviewer));
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::ApprovalRejected));
}

#[tokio::test]
async fn reject_after_terminal_is_idempotent() {
    let spec = Spec::new();
    spec.driver.push_result(&plan_json());

    let id = spec.create_workflow("TASK-1", "w", "Add button").await;
    spec.wait_for_status(&id, WorkflowStatus::Blocked).await;

    spec.request(
        "POST",
        &format!("/api/workflows/{id}/reject"),
        Some(serde_json::json!({"feedback": "no"})),
    )
    .await;
    spec.wait_for_status(&id, WorkflowStatus::Failed).await;

    let (status, body) = spec
        .request(
            "POST",
            &format!("/api/workflows/{id}/reject"),
            Some(serde_json::json!({"feedback": "again"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("already"));

    // The original feedback is untouched
    let row = spec
        .state
        .orchestrator
        .workflow(&amelia_core::WorkflowId::new(id))
        .unwrap();
    assert_eq!(row.failure_reason.as_deref(), Some("no"));
}
