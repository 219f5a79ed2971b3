use std::path::PathBuf;

use review_herald::{config::GlobalConfig, AppError};

fn sample_toml() -> &'static str {
    r#"
[http]
bind_address = "127.0.0.1"
port = 9090

[database]
path = "data/herald.db"
max_connections = 3

[slack]
test_mode = true

[reminder]
tick_seconds = 30
default_interval_minutes = 45
watch_hours = 3

[janitor]
terminal_retention_hours = 12
snoozed_retention_days = 7

[calendar]
default_timezone = "Europe/London"
extra_holidays = ["2024-12-31"]
"#
}

#[test]
fn defaults_match_documented_values() {
    let config = GlobalConfig::default();
    assert_eq!(config.http.port, 8080);
    assert_eq!(config.reminder.tick_seconds, 60);
    assert_eq!(config.reminder.default_interval_minutes, 30);
    assert_eq!(config.reminder.watch_hours, 2);
    assert_eq!(config.janitor.tick_seconds, 3600);
    assert_eq!(config.janitor.terminal_retention_hours, 24);
    assert_eq!(config.janitor.snoozed_retention_days, 14);
    assert_eq!(config.calendar.default_timezone, "Asia/Tokyo");
    assert!(!config.slack.test_mode);
    assert!(config.slack.signing_secret.is_none());
}

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("valid config");
    assert_eq!(config.http.port, 9090);
    assert_eq!(config.http.bind_address.to_string(), "127.0.0.1");
    assert_eq!(config.database.path, PathBuf::from("data/herald.db"));
    assert_eq!(config.database.max_connections, 3);
    assert!(config.slack.test_mode);
    assert_eq!(config.reminder.default_interval_minutes, 45);
    assert_eq!(config.reminder.watch_hours, 3);
    assert_eq!(config.janitor.snoozed_retention_days, 7);
    assert_eq!(config.calendar.default_tz(), chrono_tz::Europe::London);
    assert_eq!(config.calendar.extra_holiday_dates().len(), 1);
}

#[test]
fn empty_file_yields_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("empty config");
    assert_eq!(config, GlobalConfig::default());
}

#[test]
fn secrets_are_never_read_from_toml() {
    let raw = "[github]\nwebhook_secret = \"leaked\"\n";
    let config = GlobalConfig::from_toml_str(raw).expect("config");
    assert!(config.github.webhook_secret.is_empty());
}

#[test]
fn rejects_zero_tick() {
    let err = GlobalConfig::from_toml_str("[reminder]\ntick_seconds = 0\n").expect_err("invalid");
    assert!(matches!(err, AppError::Config(msg) if msg.contains("tick_seconds")));
}

#[test]
fn rejects_non_positive_interval() {
    let err = GlobalConfig::from_toml_str("[reminder]\ndefault_interval_minutes = -5\n")
        .expect_err("invalid");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn rejects_interval_longer_than_a_week() {
    let err = GlobalConfig::from_toml_str("[reminder]\ndefault_interval_minutes = 10081\n")
        .expect_err("invalid");
    assert!(matches!(err, AppError::Config(msg) if msg.contains("default_interval_minutes")));
    GlobalConfig::from_toml_str("[reminder]\ndefault_interval_minutes = 10080\n").expect("one week");
}

#[test]
fn rejects_unknown_timezone() {
    let err = GlobalConfig::from_toml_str("[calendar]\ndefault_timezone = \"Mars/Base\"\n")
        .expect_err("invalid");
    assert!(matches!(err, AppError::Config(msg) if msg.contains("Mars/Base")));
}

#[test]
fn rejects_malformed_holiday() {
    let err = GlobalConfig::from_toml_str("[calendar]\nextra_holidays = [\"31/12/2024\"]\n")
        .expect_err("invalid");
    assert!(matches!(err, AppError::Config(msg) if msg.contains("extra_holidays")));
}

#[test]
fn rejects_invalid_toml() {
    let err = GlobalConfig::from_toml_str("[http\nport = 1").expect_err("invalid");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, sample_toml()).expect("write");

    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.http.port, 9090);
}

#[test]
fn load_from_missing_path_fails() {
    let err = GlobalConfig::load_from_path("/nonexistent/review-herald.toml").expect_err("missing");
    assert!(matches!(err, AppError::Config(msg) if msg.contains("failed to read config")));
}

#[test]
#[serial_test::serial]
fn env_overrides_apply() {
    std::env::set_var("REVIEW_HERALD_DB_PATH", "/tmp/override.db");
    std::env::set_var("REVIEW_HERALD_PORT", "7000");

    let mut config = GlobalConfig::default();
    let result = config.apply_env_overrides();

    std::env::remove_var("REVIEW_HERALD_DB_PATH");
    std::env::remove_var("REVIEW_HERALD_PORT");

    result.expect("overrides");
    assert_eq!(config.database.path, PathBuf::from("/tmp/override.db"));
    assert_eq!(config.http.port, 7000);
}

#[test]
#[serial_test::serial]
fn bad_port_override_is_rejected() {
    std::env::set_var("REVIEW_HERALD_PORT", "not-a-port");

    let mut config = GlobalConfig::default();
    let result = config.apply_env_overrides();

    std::env::remove_var("REVIEW_HERALD_PORT");

    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("REVIEW_HERALD_PORT")));
}
