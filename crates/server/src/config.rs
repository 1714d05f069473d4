// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server configuration loaded from TOML.
//!
//! Every option has a serde default, so an empty file (or no file) is a
//! valid configuration. The deprecated `none` tracker alias is
//! normalized to `noop` at load.

use crate::ws::WsSettings;
use amelia_core::{DriverSettings, Profile};
use amelia_engine::{EngineConfig, RetentionConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_review_limit")]
    pub review_limit: u32,
    #[serde(default = "default_stream_tool_results")]
    pub stream_tool_results: bool,

    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: i64,
    #[serde(default = "default_log_retention_max_events")]
    pub log_retention_max_events: usize,
    /// `0` disables trace persistence entirely.
    #[serde(default = "default_trace_retention_days")]
    pub trace_retention_days: i64,
    #[serde(default = "default_checkpoint_retention_days")]
    pub checkpoint_retention_days: i64,
    /// Periodic retention sweep; `None` means shutdown-only.
    #[serde(default = "default_retention_interval_seconds")]
    pub retention_interval_seconds: Option<u64>,

    #[serde(default = "default_websocket_idle_timeout_seconds")]
    pub websocket_idle_timeout_seconds: f64,
    #[serde(default = "default_heartbeat_interval_seconds")]
    pub heartbeat_interval_seconds: f64,
    #[serde(default = "default_workflow_start_timeout_seconds")]
    pub workflow_start_timeout_seconds: f64,

    #[serde(default = "default_profile_name")]
    pub default_profile: String,
    #[serde(default = "default_profiles")]
    pub profiles: HashMap<String, Profile>,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".amelia/state")
}

fn default_log_path() -> PathBuf {
    PathBuf::from(".amelia/ameliad.log")
}

fn default_max_concurrent() -> usize {
    5
}

fn default_review_limit() -> u32 {
    3
}

fn default_stream_tool_results() -> bool {
    true
}

fn default_log_retention_days() -> i64 {
    30
}

fn default_log_retention_max_events() -> usize {
    100_000
}

fn default_trace_retention_days() -> i64 {
    7
}

fn default_checkpoint_retention_days() -> i64 {
    7
}

fn default_retention_interval_seconds() -> Option<u64> {
    Some(3600)
}

fn default_websocket_idle_timeout_seconds() -> f64 {
    300.0
}

fn default_heartbeat_interval_seconds() -> f64 {
    30.0
}

fn default_workflow_start_timeout_seconds() -> f64 {
    60.0
}

fn default_profile_name() -> String {
    "default".to_string()
}

fn default_profiles() -> HashMap<String, Profile> {
    let mut profiles = HashMap::new();
    profiles.insert(
        "default".to_string(),
        Profile {
            driver: DriverSettings {
                command: "claude".to_string(),
                model: None,
                options: None,
            },
            tracker: "noop".to_string(),
            working_dir: PathBuf::from("."),
            plan_output_dir: PathBuf::from("docs/plans"),
            architect: None,
            developer: None,
            reviewer: None,
        },
    );
    profiles
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            state_dir: default_state_dir(),
            log_path: default_log_path(),
            max_concurrent: default_max_concurrent(),
            review_limit: default_review_limit(),
            stream_tool_results: default_stream_tool_results(),
            log_retention_days: default_log_retention_days(),
            log_retention_max_events: default_log_retention_max_events(),
            trace_retention_days: default_trace_retention_days(),
            checkpoint_retention_days: default_checkpoint_retention_days(),
            retention_interval_seconds: default_retention_interval_seconds(),
            websocket_idle_timeout_seconds: default_websocket_idle_timeout_seconds(),
            heartbeat_interval_seconds: default_heartbeat_interval_seconds(),
            workflow_start_timeout_seconds: default_workflow_start_timeout_seconds(),
            default_profile: default_profile_name(),
            profiles: default_profiles(),
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(contents)?;
        // `none` is a deprecated alias of `noop`
        for profile in config.profiles.values_mut() {
            if profile.tracker == "none" {
                profile.tracker = "noop".to_string();
            }
        }
        Ok(config)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrent: self.max_concurrent,
            review_limit: self.review_limit,
            workflow_start_timeout: Duration::from_secs_f64(self.workflow_start_timeout_seconds),
            shutdown_grace: Duration::from_secs(10),
            stream_tool_results: self.stream_tool_results,
        }
    }

    pub fn retention_config(&self) -> RetentionConfig {
        RetentionConfig {
            log_retention_days: self.log_retention_days,
            log_retention_max_events: self.log_retention_max_events,
            trace_retention_days: self.trace_retention_days,
            checkpoint_retention_days: self.checkpoint_retention_days,
        }
    }

    pub fn ws_settings(&self) -> WsSettings {
        WsSettings {
            heartbeat: Duration::from_secs_f64(self.heartbeat_interval_seconds),
            idle_timeout: Duration::from_secs_f64(self.websocket_idle_timeout_seconds),
            ..WsSettings::default()
        }
    }

    pub fn trace_persistence(&self) -> bool {
        self.trace_retention_days != 0
    }

    pub fn events_path(&self) -> PathBuf {
        self.state_dir.join("events.jsonl")
    }

    pub fn workflows_path(&self) -> PathBuf {
        self.state_dir.join("workflows.jsonl")
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.state_dir.join("checkpoints")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
