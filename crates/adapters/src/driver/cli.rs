// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess driver speaking JSONL on stdio.
//!
//! Spawns the configured command in the working directory, writes one
//! JSON request object to its stdin, and parses each stdout line as a
//! [`DriverMessage`]. Malformed lines are logged and skipped. If the
//! process exits without a terminal message, one is synthesized so the
//! single-terminal contract holds for consumers.

use super::{Driver, DriverError, DriverMessage, DriverRequest};
use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Grace period between cancellation and force-kill.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Request object written to the child's stdin.
#[derive(Serialize)]
struct WireRequest<'a> {
    prompt: &'a str,
    system_prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    prior_session: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// Driver backed by a CLI agent subprocess.
#[derive(Clone, Default)]
pub struct CliDriver;

impl CliDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for CliDriver {
    async fn run(
        &self,
        request: DriverRequest,
        tx: mpsc::Sender<DriverMessage>,
        cancel: CancellationToken,
    ) -> Result<(), DriverError> {
        let mut parts = request.settings.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| DriverError::SpawnFailed("empty driver command".to_string()))?;

        let mut child = Command::new(program)
            .args(parts)
            .current_dir(&request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::SpawnFailed(e.to_string()))?;

        // Hand the request over and close stdin so the child sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            let wire = WireRequest {
                prompt: &request.prompt,
                system_prompt: &request.system_prompt,
                prior_session: request.prior_session.as_deref(),
                model: request.settings.model.as_deref(),
            };
            let mut line = serde_json::to_vec(&wire)
                .map_err(|e| DriverError::Stream(e.to_string()))?;
            line.push(b'\n');
            stdin.write_all(&line).await?;
            stdin.shutdown().await?;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::SpawnFailed("child stdout unavailable".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let mut terminated = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Cooperative window first, then force-kill.
                    let exited =
                        tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok();
                    if !exited {
                        let _ = child.kill().await;
                    }
                    let _ = tx
                        .send(DriverMessage::Error {
                            reason: "cancelled".to_string(),
                        })
                        .await;
                    return Ok(());
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(raw)) => {
                            let trimmed = raw.trim();
                            if trimmed.is_empty() {
                                continue;
                            }
                            let message: DriverMessage = match serde_json::from_str(trimmed) {
                                Ok(m) => m,
                                Err(e) => {
                                    warn!(error = %e, "malformed driver message, skipping");
                                    continue;
                                }
                            };
                            let is_terminal = message.is_terminal();
                            if tx.send(message).await.is_err() {
                                // Consumer gone; treat as cancellation.
                                let _ = child.kill().await;
                                return Ok(());
                            }
                            if is_terminal {
                                terminated = true;
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        if terminated {
            // A well-behaved driver exits promptly after its terminal
            // message; don't wait forever for one that doesn't.
            if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
                let _ = child.kill().await;
            }
            return Ok(());
        }

        let status = child.wait().await?;
        let reason = match status.code() {
            Some(code) => format!("driver exited with status {code} before terminal message"),
            None => "driver killed before terminal message".to_string(),
        };
        let _ = tx.send(DriverMessage::Error { reason }).await;

        Ok(())
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
