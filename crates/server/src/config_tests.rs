// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn empty_toml_yields_defaults() {
    let config = ServerConfig::parse("").unwrap();
    assert_eq!(config.max_concurrent, 5);
    assert_eq!(config.log_retention_days, 30);
    assert_eq!(config.log_retention_max_events, 100_000);
    assert_eq!(config.trace_retention_days, 7);
    assert_eq!(config.websocket_idle_timeout_seconds, 300.0);
    assert_eq!(config.workflow_start_timeout_seconds, 60.0);
    assert_eq!(config.review_limit, 3);
    assert!(config.profiles.contains_key("default"));
}

#[test]
fn missing_file_yields_defaults() {
    let config = ServerConfig::load(Path::new("/nonexistent/amelia.toml")).unwrap();
    assert_eq!(config.default_profile, "default");
}

#[test]
fn fields_override_defaults() {
    let config = ServerConfig::parse(
        r#"
listen_addr = "0.0.0.0:9000"
max_concurrent = 2
trace_retention_days = 0

[profiles.fast]
tracker = "noop"
working_dir = "/repo"

[profiles.fast.driver]
command = "claude --model haiku"
"#,
    )
    .unwrap();

    assert_eq!(config.listen_addr, "0.0.0.0:9000");
    assert_eq!(config.max_concurrent, 2);
    assert!(!config.trace_persistence());
    assert_eq!(
        config.profiles["fast"].driver.command,
        "claude --model haiku"
    );
}

#[test]
fn none_tracker_normalizes_to_noop() {
    let config = ServerConfig::parse(
        r#"
[profiles.legacy]
tracker = "none"
working_dir = "/repo"

[profiles.legacy.driver]
command = "claude"
"#,
    )
    .unwrap();
    assert_eq!(config.profiles["legacy"].tracker, "noop");
}

#[test]
fn engine_config_conversion() {
    let config = ServerConfig::parse("workflow_start_timeout_seconds = 5.0").unwrap();
    let engine = config.engine_config();
    assert_eq!(engine.workflow_start_timeout, Duration::from_secs(5));
    assert_eq!(engine.max_concurrent, 5);
}

#[test]
fn state_paths_derive_from_state_dir() {
    let config = ServerConfig::parse("state_dir = \"/var/lib/amelia\"").unwrap();
    assert_eq!(
        config.events_path(),
        PathBuf::from("/var/lib/amelia/events.jsonl")
    );
    assert_eq!(
        config.checkpoints_dir(),
        PathBuf::from("/var/lib/amelia/checkpoints")
    );
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = ServerConfig::parse("max_concurrent = \"many\"").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}
