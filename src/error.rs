//! Error types for Message Finder.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("Notify error: {0}")]
    Notify(#[from] NotifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised by a feed source.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Feed {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Feed {name} is already being observed")]
    AlreadyObserved { name: String },

    #[error("Malformed feed record: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings/history persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned by the control surface.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Engine stopped")]
    EngineStopped,
}

/// Notification delivery errors. Always swallowed by the forwarding task.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notifier {name} send failed: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
