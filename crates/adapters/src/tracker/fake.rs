// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake tracker for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{Tracker, TrackerError};
use amelia_core::Issue;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Tracker serving a programmable set of issues.
#[derive(Clone, Default)]
pub struct FakeTracker {
    inner: Arc<Mutex<FakeTrackerState>>,
}

#[derive(Default)]
struct FakeTrackerState {
    issues: HashMap<String, Issue>,
    unavailable: Option<String>,
    fetches: Vec<String>,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, issue: Issue) {
        self.inner.lock().issues.insert(issue.id.clone(), issue);
    }

    pub fn set_unavailable(&self, reason: &str) {
        self.inner.lock().unavailable = Some(reason.to_string());
    }

    pub fn fetches(&self) -> Vec<String> {
        self.inner.lock().fetches.clone()
    }
}

#[async_trait]
impl Tracker for FakeTracker {
    async fn fetch(&self, issue_id: &str) -> Result<Issue, TrackerError> {
        let mut inner = self.inner.lock();
        inner.fetches.push(issue_id.to_string());
        if let Some(reason) = &inner.unavailable {
            return Err(TrackerError::Unavailable(reason.clone()));
        }
        inner
            .issues
            .get(issue_id)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(issue_id.to_string()))
    }
}
