//! Scenario: the review loop and its iteration cap.

use crate::prelude::*;
use amelia_core::{AgentRole, EventType, WorkflowStatus};

#[tokio::test]
async fn two_rejections_at_limit_two_fail_the_workflow() {
    let spec = Spec::with_config(
        amelia_engine::EngineConfig {
            review_limit: 2,
            ..amelia_engine::EngineConfig::default()
        },
        true,
    );
    spec.driver.push_result(&plan_json());
    spec.driver.push_result("attempt one");
    spec.driver
        .push_result(&verdict_json(false, Some("add tests")));
    spec.driver.push_result("attempt two");
    spec.driver
        .push_result(&verdict_json(false, Some("still failing")));

    let id = spec.create_workflow("TASK-1", "w", "Add button").await;
    spec.wait_for_status(&id, WorkflowStatus::Blocked).await;
    spec.request("POST", &format!("/api/workflows/{id}/approve"), None)
        .await;
    spec.wait_for_status(&id, WorkflowStatus::Failed).await;

    let row = spec
        .state
        .orchestrator
        .workflow(&amelia_core::WorkflowId::new(id.clone()))
        .unwrap();
    assert_eq!(
        row.failure_reason.as_deref(),
        Some("review limit exceeded after 2 iterations")
    );

    let events = spec.events_of(&id);
    let revisions: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::RevisionRequested)
        .collect();
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[0].message, "add tests");
    assert_eq!(revisions[1].message, "still failing");
    assert_eq!(
        revisions[1].data.as_ref().unwrap()["iteration"],
        serde_json::json!(2)
    );

    // Two full developer stage pairs
    let developer_pairs = events
        .iter()
        .filter(|e| e.event_type == EventType::StageCompleted && e.agent == AgentRole::Developer)
        .count();
    assert_eq!(developer_pairs, 2);
}

#[tokio::test]
async fn revision_then_approval_completes() {
    let spec = Spec::new();
    spec.driver.push_result(&plan_json());
    spec.driver.push_result("attempt one");
    spec.driver
        .push_result(&verdict_json(false, Some("rename the flag")));
    spec.driver.push_result("attempt two");
    spec.driver.push_result(&verdict_json(true, None));

    let id = spec.create_workflow("TASK-1", "w", "Add button").await;
    spec.wait_for_status(&id, WorkflowStatus::Blocked).await;
    spec.request("POST", &format!("/api/workflows/{id}/approve"), None)
        .await;
    spec.wait_for_status(&id, WorkflowStatus::Completed).await;

    // The feedback was threaded into the second developer prompt
    let calls = spec.driver.calls();
    let second_dev = &calls[3];
    assert!(second_dev.prompt.contains("rename the flag"));

    let events = spec.events_of(&id);
    assert_contiguous(&events);
    assert_eq!(
        events
            .iter()
            .filter(|e| e.event_type == EventType::RevisionRequested)
            .count(),
        1
    );
}
