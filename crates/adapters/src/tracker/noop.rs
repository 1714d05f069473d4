// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Noop tracker: builds an issue from the reference alone.

use super::{Tracker, TrackerError};
use amelia_core::Issue;
use async_trait::async_trait;

/// Tracker that never performs I/O. The issue id doubles as the title;
/// ad-hoc tasks supply their own title/description at workflow creation
/// and bypass the fetch entirely.
#[derive(Clone, Default)]
pub struct NoopTracker;

impl NoopTracker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tracker for NoopTracker {
    async fn fetch(&self, issue_id: &str) -> Result<Issue, TrackerError> {
        Ok(Issue::new(issue_id, issue_id, ""))
    }
}
