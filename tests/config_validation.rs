//! Integration tests for configuration validation

#![allow(clippy::expect_used)]

use simnet::config::{
    LoggingConfig, MailboxConfig, NetworkConfig, ServerConfig, TransportConfig, DEFAULT_PROTOCOL,
};
use simnet::error::ProtocolError;
use std::time::Duration;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = NetworkConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
    assert_eq!(config.transport.protocol, DEFAULT_PROTOCOL);
}

#[test]
fn test_invalid_server_address() {
    let mut config = NetworkConfig::default();
    config.server.address = "invalid_address".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid server address")));
}

#[test]
fn test_empty_client_address() {
    let mut config = NetworkConfig::default();
    config.client.address = String::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_zero_max_connections() {
    let config = NetworkConfig::default_with_overrides(|c| c.server.max_connections = 0);
    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Max connections must be greater than 0")));
}

#[test]
fn test_shutdown_timeout_bounds() {
    let mut config = NetworkConfig::default();
    config.server.shutdown_timeout = Duration::from_millis(500);
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Shutdown timeout too short")));

    config.server.shutdown_timeout = Duration::from_secs(120);
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Shutdown timeout too long")));
}

#[test]
fn test_short_connection_timeout() {
    let mut config = NetworkConfig::default();
    config.client.connection_timeout = Duration::from_millis(50);

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Connection timeout too short")));
}

#[test]
fn test_transport_limits() {
    let config = NetworkConfig::default_with_overrides(|c| {
        c.transport = TransportConfig {
            protocol: " ".to_string(),
            max_payload_size: 0,
            max_chunk_size: 0,
            read_buffer_size: 8,
            drain_timeout: Duration::from_millis(1),
        };
    });

    let errors = config.validate();
    assert_eq!(errors.len(), 5, "got: {errors:?}");
    assert!(errors.iter().any(|e| e.contains("protocol cannot be empty")));
    assert!(errors.iter().any(|e| e.contains("Max payload size cannot be 0")));
    assert!(errors.iter().any(|e| e.contains("Max chunk size cannot be 0")));
    assert!(errors.iter().any(|e| e.contains("Read buffer size too small")));
    assert!(errors.iter().any(|e| e.contains("Drain timeout too short")));
}

#[test]
fn test_zero_backlog_warning() {
    let mut config = NetworkConfig::default();
    config.mailbox = MailboxConfig { backlog_warning: 0 };

    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("backlog warning threshold")));
}

#[test]
fn test_logging_needs_an_output() {
    let mut config = NetworkConfig::default();
    config.logging = LoggingConfig {
        log_to_console: false,
        log_to_file: false,
        ..LoggingConfig::default()
    };

    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("At least one logging output")));
}

#[test]
fn test_log_file_requires_path() {
    let mut config = NetworkConfig::default();
    config.logging.log_to_file = true;
    config.logging.log_file_path = None;

    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("log_file_path must be specified")));
}

#[test]
fn test_validate_strict_collects_every_error() {
    let mut config = NetworkConfig::default();
    config.server.address = String::new();
    config.server.max_connections = 0;

    match config.validate_strict() {
        Err(ProtocolError::ConfigError(msg)) => {
            assert!(msg.contains("Server address cannot be empty"));
            assert!(msg.contains("Max connections must be greater than 0"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_toml_partial_sections_use_defaults() {
    let config = NetworkConfig::from_toml(
        r#"
        [server]
        address = "0.0.0.0:9000"
        shutdown_timeout = 5000
        max_connections = 64

        [logging]
        app_name = "swarm"
        log_level = "debug"
        log_to_console = true
        log_to_file = false
        json_format = true
        "#,
    )
    .expect("config should parse");

    assert_eq!(config.server.address, "0.0.0.0:9000");
    assert_eq!(config.server.shutdown_timeout, Duration::from_secs(5));
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert_eq!(config.transport.max_chunk_size, TransportConfig::default().max_chunk_size);
    assert!(config.validate().is_empty());
}

#[test]
fn test_malformed_toml_is_a_config_error() {
    assert!(matches!(
        NetworkConfig::from_toml("[server\naddress = 1"),
        Err(ProtocolError::ConfigError(_))
    ));
}

#[test]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("simnet.toml");

    let config = NetworkConfig::default_with_overrides(|c| {
        c.server = ServerConfig {
            address: "127.0.0.1:9100".to_string(),
            ..ServerConfig::default()
        };
        c.transport.drain_timeout = Duration::from_millis(750);
    });
    config.save_to_file(&path).expect("save");

    let loaded = NetworkConfig::from_file(&path).expect("load");
    assert_eq!(loaded.server.address, "127.0.0.1:9100");
    assert_eq!(loaded.transport.drain_timeout, Duration::from_millis(750));
}

#[test]
fn test_example_config_parses() {
    let example = NetworkConfig::example_config();
    let parsed = NetworkConfig::from_toml(&example).expect("example config should parse");
    assert!(parsed.validate().is_empty());
}

#[test]
fn test_missing_file_is_a_config_error() {
    assert!(matches!(
        NetworkConfig::from_file("/definitely/not/here/simnet.toml"),
        Err(ProtocolError::ConfigError(_))
    ));
}
