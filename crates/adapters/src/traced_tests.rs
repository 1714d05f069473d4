// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::driver::FakeDriver;
use crate::tracker::FakeTracker;
use amelia_core::DriverSettings;
use std::path::PathBuf;

fn request() -> DriverRequest {
    DriverRequest {
        prompt: "p".to_string(),
        system_prompt: "s".to_string(),
        working_dir: PathBuf::from("/tmp"),
        prior_session: None,
        settings: DriverSettings {
            command: "fake".to_string(),
            model: None,
            options: None,
        },
    }
}

#[tokio::test]
async fn traced_driver_is_transparent() {
    let inner = FakeDriver::new();
    inner.push_result("done");
    let driver = TracedDriver::new(inner.clone());

    let (tx, mut rx) = mpsc::channel(16);
    driver
        .run(request(), tx, CancellationToken::new())
        .await
        .unwrap();

    let message = rx.recv().await.unwrap();
    assert!(message.is_terminal());
    assert_eq!(inner.calls().len(), 1);
}

#[tokio::test]
async fn traced_driver_propagates_errors() {
    let inner = FakeDriver::new();
    inner.set_spawn_error("no binary");
    let driver = TracedDriver::new(inner);

    let (tx, _rx) = mpsc::channel(16);
    let err = driver
        .run(request(), tx, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::SpawnFailed(_)));
}

#[tokio::test]
async fn traced_tracker_is_transparent() {
    let inner = FakeTracker::new();
    inner.insert(Issue::new("BUG-1", "title", ""));
    let tracker = TracedTracker::new(inner);

    let issue = tracker.fetch("BUG-1").await.unwrap();
    assert_eq!(issue.id, "BUG-1");

    let err = tracker.fetch("BUG-404").await.unwrap_err();
    assert!(matches!(err, TrackerError::NotFound(_)));
}
