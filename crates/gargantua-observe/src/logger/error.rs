use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log format {0:?} (expected text, json or journald)")]
    InvalidFormat(String),

    #[error("journald is only available on linux")]
    JournaldNotSupported,

    #[error("journald layer: {0}")]
    Journald(String),

    #[error("invalid log filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("a global logger is already installed")]
    AlreadyInitialized,
}

pub type LogResult<T> = Result<T, LogError>;
