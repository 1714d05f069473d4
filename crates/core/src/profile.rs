// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration profile consumed by the orchestrator.

use crate::event::AgentRole;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Driver launch settings for an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSettings {
    /// Command line to launch the driver process.
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

/// A configuration profile. Immutable for the duration of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub driver: DriverSettings,
    /// Tracker kind: `noop`, `github`, `jira`. `none` is a deprecated
    /// alias of `noop` accepted on load.
    #[serde(default = "default_tracker")]
    pub tracker: String,
    pub working_dir: PathBuf,
    /// Plan files land at `{plan_output_dir}/{YYYY-MM-DD}-{issue_id}.md`,
    /// resolved relative to the worktree when not absolute.
    #[serde(default = "default_plan_output_dir")]
    pub plan_output_dir: PathBuf,
    // Per-agent overrides; fall back to `driver` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architect: Option<DriverSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer: Option<DriverSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<DriverSettings>,
}

fn default_tracker() -> String {
    "noop".to_string()
}

fn default_plan_output_dir() -> PathBuf {
    PathBuf::from("docs/plans")
}

impl Profile {
    /// Driver settings for a role, falling back to the profile default.
    pub fn driver_for(&self, role: AgentRole) -> &DriverSettings {
        let override_for = match role {
            AgentRole::Architect => self.architect.as_ref(),
            AgentRole::Developer => self.developer.as_ref(),
            AgentRole::Reviewer => self.reviewer.as_ref(),
            AgentRole::System => None,
        };
        override_for.unwrap_or(&self.driver)
    }

    /// Tracker name with the deprecated `none` alias normalized away.
    pub fn normalized_tracker(&self) -> &str {
        if self.tracker == "none" {
            "noop"
        } else {
            &self.tracker
        }
    }

    pub fn is_noop_tracker(&self) -> bool {
        self.normalized_tracker() == "noop"
    }
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
