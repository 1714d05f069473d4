// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake driver for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{Driver, DriverError, DriverMessage, DriverRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Recorded call to FakeDriver
#[derive(Debug, Clone)]
pub struct DriverCall {
    pub prompt: String,
    pub system_prompt: String,
    pub prior_session: Option<String>,
    pub command: String,
}

/// Fake driver that plays back scripted message sequences.
///
/// Scripts are consumed FIFO, one per invocation. An invocation without
/// a script yields a plain successful result. All calls are recorded.
#[derive(Clone, Default)]
pub struct FakeDriver {
    inner: Arc<Mutex<FakeDriverState>>,
}

#[derive(Default)]
struct FakeDriverState {
    scripts: VecDeque<Vec<DriverMessage>>,
    calls: Vec<DriverCall>,
    spawn_error: Option<String>,
    /// When set, invocations block until cancelled.
    hang: bool,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message sequence for the next invocation.
    pub fn push_script(&self, messages: Vec<DriverMessage>) {
        self.inner.lock().scripts.push_back(messages);
    }

    /// Queue a successful run with the given final text.
    pub fn push_result(&self, final_text: &str) {
        let n = self.inner.lock().scripts.len() + 1;
        self.push_script(vec![DriverMessage::Result {
            session_id: format!("sess-{n}"),
            final_text: final_text.to_string(),
            usage: None,
        }]);
    }

    /// Queue a terminal failure.
    pub fn push_error(&self, reason: &str) {
        self.push_script(vec![DriverMessage::Error {
            reason: reason.to_string(),
        }]);
    }

    /// Make the next invocation fail to spawn.
    pub fn set_spawn_error(&self, reason: &str) {
        self.inner.lock().spawn_error = Some(reason.to_string());
    }

    /// Make invocations block until cancelled (for cancellation tests).
    pub fn set_hang(&self, hang: bool) {
        self.inner.lock().hang = hang;
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.inner.lock().calls.clone()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn run(
        &self,
        request: DriverRequest,
        tx: mpsc::Sender<DriverMessage>,
        cancel: CancellationToken,
    ) -> Result<(), DriverError> {
        let (script, hang) = {
            let mut inner = self.inner.lock();
            inner.calls.push(DriverCall {
                prompt: request.prompt.clone(),
                system_prompt: request.system_prompt.clone(),
                prior_session: request.prior_session.clone(),
                command: request.settings.command.clone(),
            });
            if let Some(reason) = inner.spawn_error.take() {
                return Err(DriverError::SpawnFailed(reason));
            }
            (inner.scripts.pop_front(), inner.hang)
        };

        if hang {
            cancel.cancelled().await;
            let _ = tx
                .send(DriverMessage::Error {
                    reason: "cancelled".to_string(),
                })
                .await;
            return Ok(());
        }

        let script = script.unwrap_or_else(|| {
            vec![DriverMessage::Result {
                session_id: "sess-fake".to_string(),
                final_text: "done".to_string(),
                usage: None,
            }]
        });

        for message in script {
            if cancel.is_cancelled() {
                let _ = tx
                    .send(DriverMessage::Error {
                        reason: "cancelled".to_string(),
                    })
                    .await;
                return Ok(());
            }
            if tx.send(message).await.is_err() {
                return Ok(());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
