/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by channels, the dispatcher and configuration loading
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum MonitoringError {
    #[error("Channel {name} failed to initialize: {reason}")]
    #[diagnostic(
        code(monitoring::channel_init),
        help("Check that the sink target exists and is writable or reachable.")
    )]
    ChannelInit { name: String, reason: String },

    #[error("Channel {0} is not initialized")]
    #[diagnostic(
        code(monitoring::channel_not_initialized),
        help("Register the channel with the dispatcher or call initialize() first.")
    )]
    ChannelNotInitialized(String),

    #[error("Channel {0} is closed")]
    #[diagnostic(
        code(monitoring::channel_closed),
        help("Closed channels cannot be reopened. Create and register a new channel.")
    )]
    ChannelClosed(String),

    #[error("Channel {0} is already registered")]
    #[diagnostic(
        code(monitoring::duplicate_channel),
        help("Channel names must be unique. Unregister the existing channel first.")
    )]
    DuplicateChannel(String),

    #[error("Connection to {addr} failed: {reason}")]
    #[diagnostic(
        code(monitoring::connection),
        help("Verify the remote sink is listening and reachable.")
    )]
    Connection { addr: String, reason: String },

    #[error("I/O error: {0}")]
    #[diagnostic(code(monitoring::io))]
    Io(String),

    #[error("Invalid severity: {0}")]
    #[diagnostic(
        code(monitoring::invalid_severity),
        help("Expected one of: trace, debug, info, warning, error, critical.")
    )]
    InvalidSeverity(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(monitoring::configuration))]
    Configuration(String),

    #[error("{0} is not initialized")]
    #[diagnostic(
        code(monitoring::not_initialized),
        help("Call initialize() before using this service.")
    )]
    NotInitialized(String),
}

impl From<std::io::Error> for MonitoringError {
    fn from(err: std::io::Error) -> Self {
        MonitoringError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for MonitoringError {
    fn from(err: serde_json::Error) -> Self {
        MonitoringError::Configuration(err.to_string())
    }
}

/// Result type for monitoring operations
pub type MonitoringResult<T> = Result<T, MonitoringError>;
