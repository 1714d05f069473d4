//! Test harness for behavioral specifications.
//!
//! Builds a full server state (orchestrator + stores + connection
//! manager) over temp directories, with a scripted fake driver and a
//! noop-tracker profile, and provides a small REST DSL over the router.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use amelia_adapters::{FakeDriver, FakeTracker};
use amelia_core::test_support::noop_profile;
use amelia_core::{
    EventRecord, FakeClock, SequentialIdGen, WorkflowId, WorkflowStatus,
};
use amelia_engine::{EngineConfig, EventBus, EventRecorder, Orchestrator};
use amelia_server::{router, AppState, ConnectionManager, WsSettings};
use amelia_storage::{CheckpointStore, EventStore, WorkflowStore};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const SPEC_POLL_INTERVAL_MS: u64 = 10;
pub const SPEC_WAIT_MAX_MS: u64 = 2000;

pub type SpecState = AppState<FakeDriver, FakeTracker, FakeClock, SequentialIdGen>;

pub struct Spec {
    pub state: SpecState,
    pub driver: FakeDriver,
    pub tracker: FakeTracker,
    pub clock: FakeClock,
    pub events: Arc<Mutex<EventStore>>,
    pub workflows: Arc<Mutex<WorkflowStore>>,
    pub checkpoints: CheckpointStore,
    pub manager: Arc<ConnectionManager>,
    dir: TempDir,
}

impl Spec {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default(), true)
    }

    pub fn with_config(config: EngineConfig, trace_persistence: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let events = Arc::new(Mutex::new(
            EventStore::open(&dir.path().join("events.jsonl")).unwrap(),
        ));
        let workflows = Arc::new(Mutex::new(
            WorkflowStore::open(&dir.path().join("workflows.jsonl")).unwrap(),
        ));
        let checkpoints = CheckpointStore::new(dir.path().join("checkpoints"));
        let manager = Arc::new(ConnectionManager::new());

        let bus = EventBus::new(
            Arc::clone(&events),
            Arc::clone(&manager) as _,
            trace_persistence,
        );
        let clock = FakeClock::new();
        clock.set_epoch_ms(chrono::Utc::now().timestamp_millis() as u64);
        let recorder = EventRecorder::new(bus, clock.clone(), SequentialIdGen::new("evt"));

        let driver = FakeDriver::new();
        let tracker = FakeTracker::new();
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), noop_profile("/tmp"));

        let orchestrator = Orchestrator::new(
            driver.clone(),
            tracker.clone(),
            clock.clone(),
            SequentialIdGen::new("wf"),
            recorder,
            Arc::clone(&workflows),
            checkpoints.clone(),
            profiles,
            "default",
            config,
        );

        let state = AppState {
            orchestrator,
            manager: Arc::clone(&manager),
            events: Arc::clone(&events),
            ws: WsSettings::default(),
        };

        Self {
            state,
            driver,
            tracker,
            clock,
            events,
            workflows,
            checkpoints,
            manager,
            dir,
        }
    }

    pub fn worktree(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Issue a request against a fresh router over the shared state.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let app = router(self.state.clone());
        let request = match body {
            Some(body) => Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, value)
    }

    /// Create a workflow for an ad-hoc task; returns its id.
    pub async fn create_workflow(&self, issue_id: &str, worktree: &str, title: &str) -> String {
        let (status, body) = self
            .request(
                "POST",
                "/api/workflows",
                Some(serde_json::json!({
                    "issue_id": issue_id,
                    "worktree_path": self.worktree(worktree),
                    "task_title": title,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn wait_for_status(&self, id: &str, status: WorkflowStatus) {
        let workflow_id = WorkflowId::new(id);
        let mut waited = 0;
        while waited < SPEC_WAIT_MAX_MS {
            if self
                .state
                .orchestrator
                .workflow(&workflow_id)
                .map(|w| w.status)
                == Some(status)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(SPEC_POLL_INTERVAL_MS)).await;
            waited += SPEC_POLL_INTERVAL_MS;
        }
        panic!(
            "workflow {id} never reached {status}; currently {:?}",
            self.state
                .orchestrator
                .workflow(&workflow_id)
                .map(|w| w.status)
        );
    }

    /// Wait for the stream's last event to be of the given type.
    pub async fn wait_for_final_event(&self, id: &str, event_type: amelia_core::EventType) {
        let workflow_id = WorkflowId::new(id);
        let mut waited = 0;
        while waited < SPEC_WAIT_MAX_MS {
            let events = self.events.lock().recent(&workflow_id, 1000);
            if events.last().map(|e| e.event_type) == Some(event_type) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(SPEC_POLL_INTERVAL_MS)).await;
            waited += SPEC_POLL_INTERVAL_MS;
        }
        panic!("workflow {id} never ended with {event_type}");
    }

    pub fn events_of(&self, id: &str) -> Vec<EventRecord> {
        self.events.lock().recent(&WorkflowId::new(id), 1000)
    }
}

pub fn plan_json() -> String {
    "{\"goal\": \"add the button\", \"markdown_content\": \"# Plan\\n\\n1. Add it.\\n\", \"key_files\": [\"src/ui.rs\"]}"
        .to_string()
}

pub fn verdict_json(approved: bool, feedback: Option<&str>) -> String {
    match feedback {
        Some(feedback) => format!(r#"{{"approved": {approved}, "feedback": "{feedback}"}}"#),
        None => format!(r#"{{"approved": {approved}}}"#),
    }
}

/// Assert stored sequences are exactly 1..=n.
pub fn assert_contiguous(events: &[EventRecord]) {
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(
        sequences,
        (1..=events.len() as u64).collect::<Vec<u64>>(),
        "sequence gap: {sequences:?}"
    );
}
