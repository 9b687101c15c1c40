//! Fixtures shared by controller tests.
use std::{collections::BTreeMap, sync::Arc};

pub(crate) use gargantua_core::store::Api;
use gargantua_core::{
    clock::ManualClock, informer::InformerSet, metrics::noop_metrics, store::Store,
};
use gargantua_model::{
    AccessCode, AccessCodeSpec, DynamicBindConfiguration, DynamicBindConfigurationSpec, Environment, EnvironmentSpec,
    LABEL_ACCESS_CODE, LABEL_BOUND, LABEL_ENVIRONMENT, LABEL_RESTRICTED_BIND,
    LABEL_SCHEDULED_EVENT, LABEL_SESSION, Labels, ObjectMeta, ScheduledEvent, ScheduledEventSpec,
    ScheduledEventStatus, Session, SessionSpec, SessionStatus, VirtualMachine,
    VirtualMachineClaim, VirtualMachineClaimSpec, VirtualMachineSpec, VirtualMachineStatus,
    VmPhase, bool_label, format_unix_date, template_label,
};
use time::{Duration, OffsetDateTime, macros::datetime};
use tokio_util::sync::CancellationToken;

use crate::context::{Context, ControllerConfig};

pub(crate) const NS: &str = "labs";

pub(crate) const T0: OffsetDateTime = datetime!(2024-06-01 09:00:00 UTC);

/// In-memory store, running informers and a manual clock.
pub(crate) struct Harness {
    pub ctx: Arc<Context>,
    pub clock: Arc<ManualClock>,
    cancel: CancellationToken,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(ControllerConfig {
            namespace: NS.to_string(),
            ..Default::default()
        })
        .await
    }

    pub async fn with_config(config: ControllerConfig) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Store::in_memory(clock.clone());
        let informers = InformerSet::new(&store, &config.namespace);
        let cancel = CancellationToken::new();
        informers.spawn(&cancel);
        assert!(informers.wait_synced(&cancel).await);

        let ctx = Context::new(store, informers, clock.clone(), config, noop_metrics());
        Self { ctx, clock, cancel }
    }

    pub fn clock_now(&self) -> OffsetDateTime {
        gargantua_core::clock::Clock::now(self.clock.as_ref())
    }

    /// Wait until every cache caught up with the store.
    pub async fn settle(&self) {
        self.ctx.informers.settle(&self.ctx.store).await;
    }

    pub async fn environment(&self, name: &str, capacity: &[(&str, u32)]) -> Environment {
        let env = Environment::new(
            ObjectMeta::named(name).in_namespace(NS),
            EnvironmentSpec {
                display_name: name.to_string(),
                provider: "test".into(),
                count_capacity: capacity.iter().map(|(t, c)| (t.to_string(), *c)).collect(),
                template_mapping: BTreeMap::new(),
            },
        );
        self.ctx.store.environments.create(env).await.unwrap()
    }

    /// Active event starting at `start` and ending at `end`, relative to [`T0`].
    pub async fn event(
        &self,
        name: &str,
        start: Duration,
        end: Duration,
        required: &[(&str, &str, u32)],
        customize: impl FnOnce(&mut ScheduledEventSpec),
    ) -> ScheduledEvent {
        let mut required_vms: BTreeMap<String, BTreeMap<String, u32>> = BTreeMap::new();
        for (env, tmpl, count) in required {
            required_vms
                .entry(env.to_string())
                .or_default()
                .insert(tmpl.to_string(), *count);
        }
        let mut spec = ScheduledEventSpec {
            creator: "admin".into(),
            display_name: name.to_string(),
            start_time: format_unix_date(T0 + start),
            end_time: format_unix_date(T0 + end),
            required_vms,
            access_code: format!("{name}-code"),
            ..Default::default()
        };
        customize(&mut spec);
        let mut se = ScheduledEvent::new(ObjectMeta::named(name).in_namespace(NS), spec);
        se.status = ScheduledEventStatus {
            active: true,
            ..Default::default()
        };
        self.ctx.store.events.create(se).await.unwrap()
    }

    pub async fn dbc(&self, name: &str, event: &str, env: &str, burst: &[(&str, u32)]) {
        let dbc = DynamicBindConfiguration::new(
            ObjectMeta::named(name).in_namespace(NS).with_labels(
                Labels::new()
                    .with(LABEL_SCHEDULED_EVENT, event)
                    .with(LABEL_ENVIRONMENT, env),
            ),
            DynamicBindConfigurationSpec {
                environment: env.to_string(),
                base_name: "dynamic".into(),
                burst_count_capacity: burst.iter().map(|(t, c)| (t.to_string(), *c)).collect(),
                ..Default::default()
            },
        );
        self.ctx.store.dbcs.create(dbc).await.unwrap();
    }

    /// Shared access code `code` pointing at `event`.
    pub async fn access_code(&self, code: &str, event: &str) {
        let ac = AccessCode::new(
            ObjectMeta::named(code)
                .in_namespace(NS)
                .with_labels(Labels::new().with(LABEL_SCHEDULED_EVENT, event)),
            AccessCodeSpec {
                code: code.to_string(),
                ..Default::default()
            },
        );
        self.ctx.store.access_codes.create(ac).await.unwrap();
    }

    pub async fn session(&self, name: &str, code: &str) -> Session {
        let mut s = Session::new(
            ObjectMeta::named(name)
                .in_namespace(NS)
                .with_labels(Labels::new().with(LABEL_ACCESS_CODE, code)),
            SessionSpec {
                user_id: "u-1".into(),
                access_code: code.to_string(),
                ..Default::default()
            },
        );
        s.status = SessionStatus {
            start_time: format_unix_date(T0),
            expiration_time: format_unix_date(T0 + Duration::hours(1)),
            active: true,
            ..Default::default()
        };
        self.ctx.store.sessions.create(s).await.unwrap()
    }

    pub async fn claim(
        &self,
        name: &str,
        code: &str,
        session: &str,
        slots: &[(&str, &str)],
        customize: impl FnOnce(&mut VirtualMachineClaim),
    ) -> VirtualMachineClaim {
        let mut claim = VirtualMachineClaim::new(
            ObjectMeta::named(name).in_namespace(NS).with_labels(
                Labels::new()
                    .with(LABEL_ACCESS_CODE, code)
                    .with(LABEL_SESSION, session),
            ),
            VirtualMachineClaimSpec {
                user_id: "u-1".into(),
                virtual_machines: slots.iter().copied().collect(),
                dynamic_capable: true,
                ..Default::default()
            },
        );
        customize(&mut claim);
        self.ctx.store.claims.create(claim).await.unwrap()
    }

    /// Unbound static VM of `template` in `env`.
    pub async fn free_vm(&self, name: &str, env: &str, template: &str, phase: VmPhase) {
        let vm = VirtualMachine {
            metadata: ObjectMeta::named(name).in_namespace(NS).with_labels(
                Labels::new()
                    .with(LABEL_ENVIRONMENT, env)
                    .with(template_label(template), "true")
                    .with(LABEL_BOUND, bool_label(false))
                    .with(LABEL_RESTRICTED_BIND, bool_label(false)),
            ),
            spec: VirtualMachineSpec {
                template_id: template.to_string(),
                ..Default::default()
            },
            status: VirtualMachineStatus {
                phase,
                environment_id: env.to_string(),
                ..Default::default()
            },
        };
        self.ctx.store.vms.create(vm).await.unwrap();
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
