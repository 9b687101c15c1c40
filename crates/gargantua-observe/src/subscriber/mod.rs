#![cfg(feature = "subscriber")]

//! Taskvisor lifecycle events as log records.
//!
//! Every informer and controller runs as a supervised unit named
//! `informer/<plural>` or `controller/<name>`. Records carry the unit name and
//! its role so restarts of a single controller can be filtered out of the
//! stream.
use async_trait::async_trait;
use taskvisor::{Event, EventKind, Subscribe};
use tracing::{debug, error, info, trace, warn};

/// Logs supervisor events through `tracing`.
#[derive(Debug, Default)]
pub struct SupervisorLog;

/// Buffered events before taskvisor reports an overflow for this subscriber.
const QUEUE_CAPACITY: usize = 1024;

#[async_trait]
impl Subscribe for SupervisorLog {
    async fn on_event(&self, event: &Event) {
        log_event(event);
    }

    fn name(&self) -> &'static str {
        "supervisor-log"
    }

    fn queue_capacity(&self) -> usize {
        QUEUE_CAPACITY
    }
}

/// Role of a supervised unit, from its name prefix.
fn role(unit: &str) -> &'static str {
    match unit.split_once('/') {
        Some(("controller", _)) => "controller",
        Some(("informer", _)) => "informer",
        _ => "task",
    }
}

fn log_event(e: &Event) {
    let unit = e.task.as_deref().unwrap_or("-");
    let role = role(unit);
    let reason = e.reason.as_deref().unwrap_or("");
    let attempt = e.attempt.unwrap_or(0);

    match e.kind {
        EventKind::TaskAddRequested
        | EventKind::TaskRemoveRequested
        | EventKind::TaskRemoved
        | EventKind::TaskStopped
        | EventKind::ControllerSubmitted => trace!(unit, role, "{}", describe(e.kind)),
        EventKind::TaskAdded | EventKind::ControllerSlotTransition => {
            debug!(unit, role, reason, "{}", describe(e.kind))
        }
        EventKind::TaskStarting => info!(unit, role, attempt, "{}", describe(e.kind)),

        EventKind::TaskFailed => error!(unit, role, attempt, reason, "{}", describe(e.kind)),
        EventKind::TimeoutHit => warn!(
            unit,
            role,
            timeout_ms = e.timeout_ms.unwrap_or(0),
            "{}",
            describe(e.kind)
        ),
        EventKind::BackoffScheduled => debug!(
            unit,
            role,
            attempt,
            delay_ms = e.delay_ms.unwrap_or(0),
            reason,
            "{}",
            if e.reason.is_some() {
                "restart scheduled after failure"
            } else {
                "next run scheduled"
            }
        ),

        EventKind::ActorExhausted => warn!(unit, role, reason, "{}", describe(e.kind)),
        EventKind::ActorDead => error!(unit, role, reason, "{}", describe(e.kind)),
        EventKind::ControllerRejected => warn!(unit, role, reason, "{}", describe(e.kind)),

        EventKind::SubscriberPanicked | EventKind::SubscriberOverflow => {
            error!(unit, reason, "{}", describe(e.kind))
        }

        EventKind::ShutdownRequested | EventKind::AllStoppedWithinGrace => {
            info!("{}", describe(e.kind))
        }
        EventKind::GraceExceeded => warn!("{}", describe(e.kind)),
    }
}

fn describe(kind: EventKind) -> &'static str {
    match kind {
        EventKind::TaskAddRequested => "unit submission requested",
        EventKind::TaskAdded => "unit registered",
        EventKind::TaskRemoveRequested => "unit removal requested",
        EventKind::TaskRemoved => "unit removed",
        EventKind::TaskStarting => "unit starting",
        EventKind::TaskStopped => "unit stopped",
        EventKind::TaskFailed => "unit failed",
        EventKind::TimeoutHit => "unit timed out",
        EventKind::BackoffScheduled => "next attempt scheduled",
        EventKind::ActorExhausted => "unit will not be restarted again",
        EventKind::ActorDead => "unit terminated permanently",
        EventKind::ControllerRejected => "submission rejected by slot admission",
        EventKind::ControllerSubmitted => "unit submitted to slot",
        EventKind::ControllerSlotTransition => "slot state changed",
        EventKind::SubscriberPanicked => "log subscriber panicked",
        EventKind::SubscriberOverflow => "supervisor event dropped",
        EventKind::ShutdownRequested => "shutdown requested",
        EventKind::AllStoppedWithinGrace => "all units stopped within grace period",
        EventKind::GraceExceeded => "grace period exceeded, some units still running",
    }
}
