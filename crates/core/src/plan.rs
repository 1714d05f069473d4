// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan artifact and agent output types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The plan as written to disk. Stored in `Workflow::plan_cache` with the
/// first-write contents; the orchestrator treats the markdown as opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanArtifact {
    pub path: PathBuf,
    pub content: String,
}

/// Structured output of the Architect agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutput {
    pub goal: String,
    pub markdown_content: String,
    #[serde(default)]
    pub key_files: Vec<String>,
}

/// Verdict returned by the Reviewer agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Token counts accumulated from driver terminal messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}
