//! Scenario: happy path with a noop tracker and an ad-hoc task.

use crate::prelude::*;
use amelia_core::{EventType, WorkflowStatus};
use axum::http::StatusCode;

#[tokio::test]
async fn ad_hoc_task_runs_the_full_pipeline() {
    let spec = Spec::new();
    spec.driver.push_result(&plan_json());
    spec.driver.push_result("made the changes");
    spec.driver.push_result(&verdict_json(true, None));

    let id = spec.create_workflow("TASK-1", "w", "Add button").await;

    // pending -> planning -> blocked with an approval_required event
    spec.wait_for_status(&id, WorkflowStatus::Blocked).await;
    let events = spec.events_of(&id);
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::ApprovalRequired));

    // The plan file is on disk under the worktree
    let plan_path = spec
        .state
        .orchestrator
        .workflow(&amelia_core::WorkflowId::new(id.clone()))
        .unwrap()
        .plan_cache
        .unwrap()
        .path;
    assert!(plan_path.starts_with(spec.worktree("w").join("docs/plans")));
    assert!(plan_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("-TASK-1.md"));
    assert!(std::fs::read_to_string(&plan_path)
        .unwrap()
        .contains("# Plan"));

    // Approve over REST; the run completes
    let (status, body) = spec
        .request("POST", &format!("/api/workflows/{id}/approve"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_progress");

    spec.wait_for_status(&id, WorkflowStatus::Completed).await;
    spec.wait_for_final_event(&id, EventType::WorkflowCompleted)
        .await;

    let events = spec.events_of(&id);
    assert!(events.len() >= 6);
    assert_contiguous(&events);
    assert_eq!(
        events.last().unwrap().event_type,
        EventType::WorkflowCompleted
    );

    // Detail endpoint reflects the terminal state
    let (status, body) = spec
        .request("GET", &format!("/api/workflows/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert!(body["recent_events"].as_array().unwrap().len() >= 6);
}

#[tokio::test]
async fn stage_events_bracket_each_agent() {
    let spec = Spec::new();
    spec.driver.push_result(&plan_json());
    spec.driver.push_result("made the changes");
    spec.driver.push_result(&verdict_json(true, None));

    let id = spec.create_workflow("TASK-2", "w", "Add button").await;
    spec.wait_for_status(&id, WorkflowStatus::Blocked).await;
    spec.request("POST", &format!("/api/workflows/{id}/approve"), None)
        .await;
    spec.wait_for_status(&id, WorkflowStatus::Completed).await;

    let events = spec.events_of(&id);
    for role in [
        amelia_core::AgentRole::Architect,
        amelia_core::AgentRole::Developer,
        amelia_core::AgentRole::Reviewer,
    ] {
        let started = events
            .iter()
            .filter(|e| e.event_type == EventType::StageStarted && e.agent == role)
            .count();
        let completed = events
            .iter()
            .filter(|e| e.event_type == EventType::StageCompleted && e.agent == role)
            .count();
        assert_eq!(started, 1, "{role} stage_started");
        assert_eq!(completed, 1, "{role} stage_completed");
    }
}
