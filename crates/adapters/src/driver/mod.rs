// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver protocol: a uniform streaming interface to any LLM backend.
//!
//! A driver consumes a prompt plus context and yields a sequence of
//! typed messages over a channel. The contract every implementation
//! must honor:
//! - Exactly one terminal message ([`DriverMessage::Result`] or
//!   [`DriverMessage::Error`]) per invocation. Consumers treat stream
//!   end without one as an unterminated-stream error.
//! - Tool calls precede their matching tool result by `call_id`.
//! - If `prior_session` is set, the driver resumes that context; the
//!   `session_id` in the terminal result may be reused later.
//! - On cancellation the driver stops within a bounded time and still
//!   produces a terminal message.

mod cli;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use cli::CliDriver;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{DriverCall, FakeDriver};

use amelia_core::{CallId, DriverSettings, TokenUsage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Errors from driver operations
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One invocation of a driver.
#[derive(Debug, Clone)]
pub struct DriverRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub working_dir: PathBuf,
    /// Session to resume, from a previous invocation's terminal result.
    pub prior_session: Option<String>,
    pub settings: DriverSettings,
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Typed messages a driver yields.
///
/// Serialized as JSONL on the wire of subprocess drivers, with a
/// `{"type": ...}` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverMessage {
    /// Model's internal reasoning (opaque text).
    Thinking { content: String },

    /// Model invoked a tool; the tool has not yet returned.
    ToolCall {
        id: CallId,
        tool_name: String,
        tool_input: serde_json::Value,
    },

    /// The tool's result, possibly intercepted by middleware.
    ToolResult {
        call_id: CallId,
        output: String,
        #[serde(default, skip_serializing_if = "is_false")]
        is_error: bool,
    },

    /// Intermediate assistant text.
    Output { content: String },

    /// Terminal success; guarantees no further messages.
    Result {
        session_id: String,
        final_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },

    /// Terminal failure.
    Error { reason: String },
}

impl DriverMessage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DriverMessage::Result { .. } | DriverMessage::Error { .. })
    }
}

/// Streaming interface to an LLM execution backend.
///
/// Implementations push messages into `tx` and return once the stream is
/// finished. A send failure means the consumer went away; drivers treat
/// that as cancellation.
#[async_trait]
pub trait Driver: Clone + Send + Sync + 'static {
    async fn run(
        &self,
        request: DriverRequest,
        tx: mpsc::Sender<DriverMessage>,
        cancel: CancellationToken,
    ) -> Result<(), DriverError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
