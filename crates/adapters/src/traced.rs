// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::driver::{Driver, DriverError, DriverMessage, DriverRequest};
use crate::tracker::{Tracker, TrackerError};
use amelia_core::Issue;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Wrapper that adds tracing to any Driver
#[derive(Clone)]
pub struct TracedDriver<D> {
    inner: D,
}

impl<D> TracedDriver<D> {
    pub fn new(inner: D) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<D: Driver> Driver for TracedDriver<D> {
    async fn run(
        &self,
        request: DriverRequest,
        tx: mpsc::Sender<DriverMessage>,
        cancel: CancellationToken,
    ) -> Result<(), DriverError> {
        let span = tracing::info_span!(
            "driver.run",
            command = %request.settings.command,
            working_dir = %request.working_dir.display(),
            resumed = request.prior_session.is_some(),
        );
        async {
            tracing::info!(prompt_len = request.prompt.len(), "starting");
            let start = std::time::Instant::now();
            let result = self.inner.run(request, tx, cancel).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(()) => tracing::info!(elapsed_ms, "stream finished"),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "run failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Wrapper that adds tracing to any Tracker
#[derive(Clone)]
pub struct TracedTracker<T> {
    inner: T,
}

impl<T> TracedTracker<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: Tracker> Tracker for TracedTracker<T> {
    async fn fetch(&self, issue_id: &str) -> Result<Issue, TrackerError> {
        let result = self.inner.fetch(issue_id).await;
        tracing::info_span!("tracker.fetch", issue_id).in_scope(|| match &result {
            Ok(issue) => tracing::debug!(title = %issue.title, "fetched"),
            Err(e) => tracing::warn!(error = %e, "fetch failed"),
        });
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
