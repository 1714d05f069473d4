// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use amelia_core::DriverSettings;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write an executable shell script and return its path.
fn script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("driver.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn request(dir: &Path, command: &str) -> DriverRequest {
    DriverRequest {
        prompt: "do it".to_string(),
        system_prompt: "you are a test".to_string(),
        working_dir: dir.to_path_buf(),
        prior_session: None,
        settings: DriverSettings {
            command: command.to_string(),
            model: None,
            options: None,
        },
    }
}

async fn collect(
    request: DriverRequest,
    cancel: CancellationToken,
) -> (Vec<DriverMessage>, Result<(), DriverError>) {
    let (tx, mut rx) = mpsc::channel(64);
    let driver = CliDriver::new();
    let handle = tokio::spawn(async move { driver.run(request, tx, cancel).await });

    let mut messages = Vec::new();
    while let Some(msg) = rx.recv().await {
        messages.push(msg);
    }
    let result = handle.await.unwrap();
    (messages, result)
}

#[tokio::test]
async fn streams_jsonl_messages_until_terminal() {
    let dir = TempDir::new().unwrap();
    let path = script(
        dir.path(),
        r#"cat > /dev/null
printf '%s\n' '{"type":"thinking","content":"hm"}'
printf '%s\n' '{"type":"tool_call","id":"c1","tool_name":"Bash","tool_input":{}}'
printf '%s\n' '{"type":"tool_result","call_id":"c1","output":"ok"}'
printf '%s\n' '{"type":"result","session_id":"s1","final_text":"all done"}'
"#,
    );

    let (messages, result) = collect(
        request(dir.path(), path.to_str().unwrap()),
        CancellationToken::new(),
    )
    .await;

    result.unwrap();
    assert_eq!(messages.len(), 4);
    assert!(messages.last().unwrap().is_terminal());
    match &messages[3] {
        DriverMessage::Result { final_text, .. } => assert_eq!(final_text, "all done"),
        other => panic!("unexpected terminal: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
    let dir = TempDir::new().unwrap();
    let path = script(
        dir.path(),
        r#"cat > /dev/null
printf '%s\n' 'not json at all'
printf '%s\n' '{"type":"result","session_id":"s1","final_text":"ok"}'
"#,
    );

    let (messages, result) = collect(
        request(dir.path(), path.to_str().unwrap()),
        CancellationToken::new(),
    )
    .await;

    result.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_terminal());
}

#[tokio::test]
async fn exit_without_terminal_synthesizes_error() {
    let dir = TempDir::new().unwrap();
    let path = script(
        dir.path(),
        r#"cat > /dev/null
printf '%s\n' '{"type":"output","content":"partial"}'
exit 3
"#,
    );

    let (messages, result) = collect(
        request(dir.path(), path.to_str().unwrap()),
        CancellationToken::new(),
    )
    .await;

    result.unwrap();
    assert_eq!(messages.len(), 2);
    match &messages[1] {
        DriverMessage::Error { reason } => assert!(reason.contains("status 3")),
        other => panic!("unexpected terminal: {other:?}"),
    }
}

#[tokio::test]
async fn empty_command_fails_to_spawn() {
    let dir = TempDir::new().unwrap();
    let (_, result) = collect(request(dir.path(), "   "), CancellationToken::new()).await;
    assert!(matches!(result, Err(DriverError::SpawnFailed(_))));
}

#[tokio::test]
async fn cancellation_kills_the_child_and_terminates_the_stream() {
    let dir = TempDir::new().unwrap();
    let path = script(
        dir.path(),
        r#"cat > /dev/null
sleep 30
"#,
    );

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        cancel_clone.cancel();
    });

    let started = std::time::Instant::now();
    let (messages, result) = collect(request(dir.path(), path.to_str().unwrap()), cancel).await;

    result.unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    match messages.last() {
        Some(DriverMessage::Error { reason }) => assert_eq!(reason, "cancelled"),
        other => panic!("unexpected terminal: {other:?}"),
    }
}
