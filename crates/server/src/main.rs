// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Amelia daemon (ameliad)
//!
//! Owns the orchestrator and serves the HTTP/WebSocket surface.
//!
//! Startup: load config, open the stores, resume non-terminal
//! workflows from their checkpoints, then serve. Shutdown: stop
//! accepting connections, cancel active workflows with a bounded
//! grace period, run retention, exit.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use amelia_adapters::{CliDriver, NoopTracker, TracedDriver, TracedTracker};
use amelia_core::{SystemClock, UuidIdGen};
use amelia_engine::{EventBus, EventRecorder, Orchestrator, RetentionService};
use amelia_server::{router, AppState, ConnectionManager, ServerConfig};
use amelia_storage::{CheckpointStore, EventStore, WorkflowStore};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("ameliad {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("ameliad {}", env!("CARGO_PKG_VERSION"));
                println!("Amelia daemon - drives coding workflows and serves the dashboard API");
                println!();
                println!("USAGE:");
                println!("    ameliad");
                println!();
                println!("Configuration is read from AMELIA_CONFIG (default: amelia.toml).");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: ameliad [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config_path =
        std::env::var("AMELIA_CONFIG").unwrap_or_else(|_| "amelia.toml".to_string());
    let config = ServerConfig::load(Path::new(&config_path))?;

    rotate_log_if_needed(&config.log_path);
    let _log_guard = setup_logging(&config)?;

    info!(config = %config_path, "starting ameliad");

    // Stores
    let events = Arc::new(Mutex::new(EventStore::open(&config.events_path())?));
    let workflows = Arc::new(Mutex::new(WorkflowStore::open(&config.workflows_path())?));
    let checkpoints = CheckpointStore::new(config.checkpoints_dir());

    // Live fan-out and the bus feeding it
    let manager = Arc::new(ConnectionManager::new());
    let bus = EventBus::new(
        Arc::clone(&events),
        Arc::clone(&manager) as _,
        config.trace_persistence(),
    );
    let clock = SystemClock;
    let recorder = EventRecorder::new(bus, clock.clone(), UuidIdGen);

    let orchestrator = Orchestrator::new(
        TracedDriver::new(CliDriver::new()),
        TracedTracker::new(NoopTracker::new()),
        clock.clone(),
        UuidIdGen,
        recorder,
        Arc::clone(&workflows),
        checkpoints.clone(),
        config.profiles.clone(),
        config.default_profile.clone(),
        config.engine_config(),
    );

    // Resume anything the previous process left non-terminal
    let resumed = orchestrator.recover().await;
    if resumed > 0 {
        info!(resumed, "resumed workflows from checkpoints");
    }

    let retention = Arc::new(RetentionService::new(
        Arc::clone(&events),
        Arc::clone(&workflows),
        checkpoints,
        config.retention_config(),
        clock,
    ));
    if let Some(interval_secs) = config.retention_interval_seconds {
        spawn_retention_task(Arc::clone(&retention), Duration::from_secs(interval_secs));
    }

    let state = AppState {
        orchestrator: orchestrator.clone(),
        manager,
        events,
        ws: config.ws_settings(),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "ameliad ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain active workflows, then sweep
    info!("shutting down: cancelling active workflows");
    orchestrator.shutdown().await;
    retention.run();
    info!("ameliad stopped");
    Ok(())
}

/// Resolves when SIGTERM or SIGINT arrives.
async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            return std::future::pending().await;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGINT handler");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}

fn spawn_retention_task(retention: Arc<RetentionService<SystemClock>>, interval: Duration) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        // The first tick fires immediately; skip it.
        timer.tick().await;
        loop {
            timer.tick().await;
            retention.run();
        }
    });
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep.
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Best-effort: rotation failures are silently ignored so the daemon
/// still starts.
fn rotate_log_if_needed(log_path: &Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &ServerConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let parent = config
        .log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;
    let file_name = config
        .log_path
        .file_name()
        .ok_or_else(|| std::io::Error::other("log_path has no file name"))?;

    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
