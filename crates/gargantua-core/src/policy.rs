use gargantua_model::{AdmissionStrategy, BackoffStrategy, RestartStrategy, TimeoutMs};

/// Supervision policy for a long-running unit.
///
/// `timeout_ms == 0` means no timeout; informers and controllers run until
/// cancelled.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskPolicy {
    pub slot: String,
    pub timeout_ms: TimeoutMs,
    pub restart: RestartStrategy,
    pub backoff: BackoffStrategy,
    pub admission: AdmissionStrategy,
}

impl TaskPolicy {
    pub fn new(
        slot: impl Into<String>,
        timeout_ms: TimeoutMs,
        restart: RestartStrategy,
        backoff: BackoffStrategy,
        admission: AdmissionStrategy,
    ) -> Self {
        Self {
            slot: slot.into(),
            timeout_ms,
            restart,
            backoff,
            admission,
        }
    }

    /// Policy for a unit that should run until shutdown: no timeout, restarted
    /// with exponential backoff when it fails, never started twice.
    pub fn long_running(slot: impl Into<String>) -> Self {
        Self::new(
            slot,
            0,
            RestartStrategy::OnFailure,
            BackoffStrategy::default(),
            AdmissionStrategy::DropIfRunning,
        )
    }
}
