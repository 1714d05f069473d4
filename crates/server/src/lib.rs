// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Amelia HTTP/WebSocket surface
//!
//! REST endpoints for workflow CRUD and approvals, plus the live event
//! stream at `/ws/events` with backfill-on-reconnect.

pub mod api;
pub mod config;
pub mod ws;

pub use api::{router, AppState};
pub use config::{ConfigError, ServerConfig};
pub use ws::{ConnectionManager, WsSettings};
