//! Supervision of informers and controllers on a taskvisor [`Supervisor`].
//!
//! Every [`Runnable`] becomes one task in its own slot. A unit that stops
//! because of cancellation reports `Canceled`; any other exit is a failure and
//! is restarted according to its [`TaskPolicy`].
use std::sync::Arc;

use taskvisor::{Subscribe, Supervisor, TaskError, TaskFn, TaskRef};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub use taskvisor::{Config as SupervisorConfig, ControllerConfig};

use crate::{error::CoreError, map::to_controller_spec, policy::TaskPolicy, runtime::Runnable};

/// Wrap a unit into a taskvisor task.
pub fn runnable_task(unit: Arc<dyn Runnable>) -> TaskRef {
    TaskFn::arc(unit.name(), move |ctx: CancellationToken| {
        let unit = unit.clone();
        async move {
            if ctx.is_cancelled() {
                return Err(TaskError::Canceled);
            }
            let name = unit.name();
            let res = unit.run(ctx.clone()).await;
            if ctx.is_cancelled() {
                debug!(unit = %name, "unit stopped on cancel");
                return Err(TaskError::Canceled);
            }
            match res {
                Ok(()) => Err(TaskError::Fail {
                    reason: format!("{name} exited without cancellation"),
                }),
                Err(e) => Err(TaskError::Fail {
                    reason: format!("{name} failed: {e}"),
                }),
            }
        }
    })
}

/// Thin wrapper around taskvisor [`Supervisor`].
pub struct SupervisorApi {
    sup: Arc<Supervisor>,
}

impl SupervisorApi {
    /// Create a supervisor with explicit configs and start its run loop in background.
    pub async fn new(
        sup_cfg: SupervisorConfig,
        ctrl_cfg: ControllerConfig,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Result<Self, CoreError> {
        let sup = Supervisor::builder(sup_cfg)
            .with_subscribers(subscribers)
            .with_controller(ctrl_cfg)
            .build();

        let runner = Arc::clone(&sup);
        tokio::spawn(async move {
            if let Err(e) = runner.run(Vec::new()).await {
                tracing::error!(error = %e, "supervisor run loop exited with error");
            }
        });
        sup.wait_ready().await;
        info!("supervisor is ready to accept tasks");
        Ok(Self { sup })
    }

    /// Get a clone of the underlying supervisor handle.
    pub fn supervisor(&self) -> Arc<Supervisor> {
        Arc::clone(&self.sup)
    }

    /// Submit a unit with an explicit policy.
    #[instrument(level = "debug", skip(self, unit, policy), fields(slot = %policy.slot))]
    pub async fn submit(&self, unit: Arc<dyn Runnable>, policy: &TaskPolicy) -> Result<(), CoreError> {
        debug!("submitting via controller");
        self.sup
            .submit(to_controller_spec(runnable_task(unit), policy))
            .await
            .map_err(|e| CoreError::Supervisor(e.to_string()))
    }

    /// Submit a unit with [`TaskPolicy::long_running`] in a slot named after it.
    pub async fn submit_long_running(&self, unit: Arc<dyn Runnable>) -> Result<(), CoreError> {
        let policy = TaskPolicy::long_running(unit.name());
        self.submit(unit, &policy).await
    }

    /// Cancel every unit and wait for each one to stop.
    ///
    /// Controllers are cancelled before informers. Each unit gets the
    /// supervisor's grace period.
    pub async fn shutdown(&self) -> Result<(), CoreError> {
        let mut names = self.sup.list_tasks().await;
        names.sort_by_key(|n| !n.starts_with(CONTROLLER_PREFIX));

        let mut stuck = Vec::new();
        for name in names {
            match self.sup.cancel(&name).await {
                Ok(_) => debug!(unit = %name, "unit stopped"),
                Err(e) => {
                    warn!(unit = %name, error = %e, "unit did not stop in time");
                    stuck.push(name);
                }
            }
        }
        if !stuck.is_empty() {
            return Err(CoreError::Supervisor(format!(
                "units still running after shutdown: {}",
                stuck.join(", ")
            )));
        }
        info!("all units stopped");
        Ok(())
    }
}

const CONTROLLER_PREFIX: &str = "controller/";
