mod config;
mod error;
mod install;
mod object;

pub use config::LogConfig;
pub use error::{LogError, LogResult};
pub use object::{LogFilter, LogFormat, UtcRfc3339};

/// Install the global subscriber described by `cfg`.
///
/// Fails with [`LogError::AlreadyInitialized`] when called twice.
///
/// ```rust
/// use gargantua_observe::{LogConfig, init_logger};
///
/// init_logger(&LogConfig::default()).expect("logger");
/// tracing::info!(controller = "scheduledevent", "started");
/// ```
pub fn init_logger(cfg: &LogConfig) -> LogResult<()> {
    match cfg.format {
        LogFormat::Text => install::text(cfg),
        LogFormat::Json => install::json(cfg),
        LogFormat::Journald => install::journald(cfg),
    }
}
