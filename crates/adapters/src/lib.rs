// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for external I/O
//!
//! Two adapter families, each a trait with a production implementation
//! and a scripted fake:
//! - [`Driver`]: streaming interface to an LLM execution backend.
//! - [`Tracker`]: issue lookup shim.

pub mod driver;
pub mod tracker;
mod traced;

pub use driver::{CliDriver, Driver, DriverError, DriverMessage, DriverRequest};
pub use tracker::{NoopTracker, Tracker, TrackerError};
pub use traced::{TracedDriver, TracedTracker};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use driver::{DriverCall, FakeDriver};
#[cfg(any(test, feature = "test-support"))]
pub use tracker::FakeTracker;
