use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::logger::{
    config::LogConfig,
    error::{LogError, LogResult},
    object::UtcRfc3339,
};

pub(super) fn text(cfg: &LogConfig) -> LogResult<()> {
    let layer = fmt::layer()
        .with_ansi(cfg.should_use_color())
        .with_target(cfg.with_targets)
        .with_timer(UtcRfc3339);

    install(tracing_subscriber::registry().with(cfg.filter.to_env_filter()).with(layer))
}

pub(super) fn json(cfg: &LogConfig) -> LogResult<()> {
    let layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_target(cfg.with_targets)
        .with_current_span(cfg.with_spans)
        .with_span_list(false)
        .with_timer(UtcRfc3339);

    install(tracing_subscriber::registry().with(cfg.filter.to_env_filter()).with(layer))
}

#[cfg(target_os = "linux")]
pub(super) fn journald(cfg: &LogConfig) -> LogResult<()> {
    let layer = tracing_journald::layer()
        .map_err(|e| LogError::Journald(e.to_string()))?
        .with_syslog_identifier("gargantua".to_string());

    install(tracing_subscriber::registry().with(cfg.filter.to_env_filter()).with(layer))
}

#[cfg(not(target_os = "linux"))]
pub(super) fn journald(_cfg: &LogConfig) -> LogResult<()> {
    Err(LogError::JournaldNotSupported)
}

fn install<S>(subscriber: S) -> LogResult<()>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::object::LogFormat;

    #[test]
    #[cfg(not(target_os = "linux"))]
    fn journald_is_rejected_off_linux() {
        let cfg = LogConfig {
            format: LogFormat::Journald,
            ..Default::default()
        };
        assert!(matches!(journald(&cfg), Err(LogError::JournaldNotSupported)));
    }

    #[test]
    fn second_install_reports_already_initialized() {
        let cfg = LogConfig {
            format: LogFormat::Json,
            use_color: false,
            ..Default::default()
        };
        let first = json(&cfg);
        let second = text(&cfg);
        // Another test may have installed a logger first; either way the
        // second call in this process must fail.
        assert!(first.is_ok() || matches!(first, Err(LogError::AlreadyInitialized)));
        assert!(matches!(second, Err(LogError::AlreadyInitialized)));
    }
}
