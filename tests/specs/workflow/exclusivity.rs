//! Scenario: per-worktree exclusivity and the global concurrency cap.

use crate::prelude::*;
use amelia_core::WorkflowStatus;
use amelia_engine::EngineConfig;
use axum::http::StatusCode;

#[tokio::test]
async fn second_workflow_on_the_same_worktree_conflicts() {
    let spec = Spec::new();
    spec.driver.push_result(&plan_json());

    let first = spec.create_workflow("TASK-1", "w", "Add button").await;
    spec.wait_for_status(&first, WorkflowStatus::Blocked).await;

    let (status, body) = spec
        .request(
            "POST",
            "/api/workflows",
            Some(serde_json::json!({
                "issue_id": "TASK-2",
                "worktree_path": spec.worktree("w"),
                "task_title": "Another task",
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "workflow_conflict");
}

#[tokio::test]
async fn cap_rejects_the_overflow_then_admits_after_completion() {
    let spec = Spec::with_config(
        EngineConfig {
            max_concurrent: 2,
            ..EngineConfig::default()
        },
        true,
    );

    spec.driver.push_result(&plan_json());
    spec.driver.push_result(&plan_json());
    let a = spec.create_workflow("TASK-A", "wa", "Task A").await;
    let b = spec.create_workflow("TASK-B", "wb", "Task B").await;
    spec.wait_for_status(&a, WorkflowStatus::Blocked).await;
    spec.wait_for_status(&b, WorkflowStatus::Blocked).await;

    let (status, body) = spec
        .request(
            "POST",
            "/api/workflows",
            Some(serde_json::json!({
                "issue_id": "TASK-C",
                "worktree_path": spec.worktree("wc"),
                "task_title": "Task C",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "rate_limit");

    // Finish one; the slot opens
    spec.driver.push_result("done");
    spec.driver.push_result(&verdict_json(true, None));
    spec.request("POST", &format!("/api/workflows/{a}/approve"), None)
        .await;
    spec.wait_for_status(&a, WorkflowStatus::Completed).await;

    // The permit is released when the task fully finishes
    let mut admitted = false;
    for _ in 0..100 {
        spec.driver.push_result(&plan_json());
        let (status, _) = spec
            .request(
                "POST",
                "/api/workflows",
                Some(serde_json::json!({
                    "issue_id": "TASK-C",
                    "worktree_path": spec.worktree("wc"),
                    "task_title": "Task C",
                })),
            )
            .await;
        if status == StatusCode::CREATED {
            admitted = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(SPEC_POLL_INTERVAL_MS)).await;
    }
    assert!(admitted, "slot never opened after completion");
}
