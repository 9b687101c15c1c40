//! Model-level strategies to taskvisor policies.
use std::time::Duration;

use gargantua_model::{AdmissionStrategy, BackoffStrategy, JitterStrategy, RestartStrategy};
use taskvisor::ControllerAdmission as AdmissionPolicy;
use taskvisor::{BackoffPolicy, ControllerSpec, JitterPolicy, RestartPolicy, TaskRef, TaskSpec};

use crate::policy::TaskPolicy;

pub fn to_admission_policy(s: AdmissionStrategy) -> AdmissionPolicy {
    match s {
        AdmissionStrategy::DropIfRunning => AdmissionPolicy::DropIfRunning,
        AdmissionStrategy::Replace => AdmissionPolicy::Replace,
        AdmissionStrategy::Queue => AdmissionPolicy::Queue,
    }
}

pub fn to_restart_policy(s: RestartStrategy) -> RestartPolicy {
    match s {
        RestartStrategy::OnFailure => RestartPolicy::OnFailure,
        RestartStrategy::Always => RestartPolicy::Always,
        RestartStrategy::Never => RestartPolicy::Never,
    }
}

pub fn to_jitter_policy(s: JitterStrategy) -> JitterPolicy {
    match s {
        JitterStrategy::Decorrelated => JitterPolicy::Decorrelated,
        JitterStrategy::Equal => JitterPolicy::Equal,
        JitterStrategy::Full => JitterPolicy::Full,
        JitterStrategy::None => JitterPolicy::None,
    }
}

pub fn to_backoff_policy(s: &BackoffStrategy) -> BackoffPolicy {
    BackoffPolicy {
        success_delay: s.delay_ms.map(Duration::from_millis),
        first: Duration::from_millis(s.first_ms),
        max: Duration::from_millis(s.max_ms),
        jitter: to_jitter_policy(s.jitter),
        factor: s.factor,
    }
}

/// Zero means "no timeout".
pub fn to_timeout(timeout_ms: u64) -> Option<Duration> {
    (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms))
}

pub fn to_task_spec(task: TaskRef, p: &TaskPolicy) -> TaskSpec {
    TaskSpec::new(
        task,
        to_restart_policy(p.restart),
        to_backoff_policy(&p.backoff),
        to_timeout(p.timeout_ms),
    )
}

pub fn to_controller_spec(task: TaskRef, p: &TaskPolicy) -> ControllerSpec {
    ControllerSpec {
        admission: to_admission_policy(p.admission),
        task_spec: to_task_spec(task, p),
    }
}
