use gargantua_core::informer::Lister;
use gargantua_model::{SETTING_SCHEDULED_EVENT_RETENTION_TIME, Setting};
use time::Duration;
use tracing::warn;

/// Retention of finished scheduled events.
///
/// Read from the `scheduledevent-retention-time` setting in hours; a missing
/// or unparsable value falls back to `default_hours`.
pub fn event_retention(settings: &Lister<Setting>, namespace: &str, default_hours: i64) -> Duration {
    let hours = match settings.get(namespace, SETTING_SCHEDULED_EVENT_RETENTION_TIME) {
        None => default_hours,
        Some(s) => match s.spec.value.trim().parse::<i64>() {
            Ok(h) if h >= 0 => h,
            _ => {
                warn!(
                    setting = SETTING_SCHEDULED_EVENT_RETENTION_TIME,
                    value = %s.spec.value,
                    default_hours,
                    "invalid retention setting, using default"
                );
                default_hours
            }
        },
    };
    Duration::hours(hours)
}
