//! Scenario: trace persistence off — live view still streams traces.

use crate::prelude::*;
use amelia_adapters::DriverMessage;
use amelia_core::{CallId, EventLevel, WorkflowStatus};
use amelia_server::ws::ServerMessage;

#[tokio::test]
async fn disabled_trace_persistence_streams_live_but_stores_nothing() {
    let spec = Spec::with_config(amelia_engine::EngineConfig::default(), false);

    // A live dashboard connection watching everything
    let (conn, mut rx) = spec.manager.register();
    spec.manager.subscribe_all(conn);

    spec.driver.push_script(vec![
        DriverMessage::Thinking {
            content: "thinking out loud".to_string(),
        },
        DriverMessage::ToolCall {
            id: CallId::new("c1"),
            tool_name: "Read".to_string(),
            tool_input: serde_json::json!({"file": "src/ui.rs"}),
        },
        DriverMessage::Result {
            session_id: "sess-1".to_string(),
            final_text: plan_json(),
            usage: None,
        },
    ]);

    let id = spec.create_workflow("TASK-1", "w", "Add button").await;
    spec.wait_for_status(&id, WorkflowStatus::Blocked).await;

    // Nothing trace-level in the store, stream still contiguous
    let stored = spec.events_of(&id);
    assert!(stored.iter().all(|e| e.level != EventLevel::Trace));
    assert_contiguous(&stored);

    // The live connection saw the trace events anyway
    let mut live_traces = 0;
    while let Ok(message) = rx.try_recv() {
        if let ServerMessage::Event { payload } = message {
            if payload.level == EventLevel::Trace {
                live_traces += 1;
                assert_eq!(payload.sequence, 0, "live-only traces are unsequenced");
            }
        }
    }
    assert_eq!(live_traces, 2);
}

#[tokio::test]
async fn enabled_trace_persistence_stores_traces_in_sequence() {
    let spec = Spec::new();

    spec.driver.push_script(vec![
        DriverMessage::Thinking {
            content: "thinking".to_string(),
        },
        DriverMessage::Result {
            session_id: "sess-1".to_string(),
            final_text: plan_json(),
            usage: None,
        },
    ]);

    let id = spec.create_workflow("TASK-1", "w", "Add button").await;
    spec.wait_for_status(&id, WorkflowStatus::Blocked).await;

    let stored = spec.events_of(&id);
    assert!(stored.iter().any(|e| e.level == EventLevel::Trace));
    assert_contiguous(&stored);
}
