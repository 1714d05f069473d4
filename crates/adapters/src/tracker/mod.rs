// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issue tracker adapters
//!
//! A tracker is a pure I/O shim producing an [`Issue`] value. Hosted
//! trackers (GitHub, Jira) plug in behind the same trait; the built-in
//! [`NoopTracker`] serves ad-hoc tasks and offline runs.

mod noop;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use noop::NoopTracker;

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeTracker;

use amelia_core::Issue;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from tracker operations
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("issue not found: {0}")]
    NotFound(String),
    #[error("tracker unavailable: {0}")]
    Unavailable(String),
}

/// Issue lookup shim.
#[async_trait]
pub trait Tracker: Clone + Send + Sync + 'static {
    async fn fetch(&self, issue_id: &str) -> Result<Issue, TrackerError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
