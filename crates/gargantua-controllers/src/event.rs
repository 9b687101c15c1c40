//! Scheduled event lifecycle.
//!
//! Each pass runs at most one step, chosen from the event's status and the
//! current time:
//!
//! * on-demand events drop any VMSets they still list;
//! * after the end time an active event is completed;
//! * after the start time an active event is provisioned;
//! * a provisioned event is verified until its VMSets are full;
//! * a finished event is deleted once its retention period has passed.
//!
//! The event is re-read from the store on every pass so a stale cache never
//! repeats a step. All generated objects carry deterministic names and the
//! `scheduledevent` label.
use std::{sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use gargantua_core::{
    retry,
    runtime::{Action, ReconcileError, ReconcileResult, Reconciler},
    store::{ListParams, OptionalExt, ignore_not_found},
};
use gargantua_model::{
    AccessCode, AccessCodeSpec, DynamicBindConfiguration, DynamicBindConfigurationSpec,
    LABEL_ACCESS_CODE, LABEL_ENVIRONMENT, LABEL_ONE_TIME_ACCESS_CODE, LABEL_RESTRICTED_BIND,
    LABEL_RESTRICTED_BIND_VALUE, LABEL_SCHEDULED_EVENT, Labels, ObjectMeta, Resource,
    ScheduledEvent, Selector, VirtualMachineSet, VirtualMachineSetSpec, bool_label,
    format_unix_date, split_key, template_label,
};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

use crate::{context::Context, naming, settings::event_retention, upsert::upsert};

pub struct ScheduledEventReconciler {
    ctx: Arc<Context>,
}

/// Labels shared by every object generated for `se`.
fn owned_labels(se: &ScheduledEvent) -> Labels {
    let mut labels = Labels::new()
        .with(LABEL_SCHEDULED_EVENT, se.name())
        .with(LABEL_RESTRICTED_BIND, bool_label(se.spec.restricted_bind));
    if se.spec.restricted_bind {
        labels.insert(LABEL_RESTRICTED_BIND_VALUE, se.bind_value());
    }
    labels
}

fn owned_meta(se: &ScheduledEvent, name: String, labels: Labels) -> ObjectMeta {
    ObjectMeta::named(name)
        .in_namespace(se.metadata.namespace.clone())
        .with_labels(labels)
        .owned_by(se.controller_ref())
}

fn by_event(namespace: &str, event: &str) -> ListParams {
    ListParams::namespaced(namespace).with_selector(Selector::everything().eq(LABEL_SCHEDULED_EVENT, event))
}

impl ScheduledEventReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Remove everything generated for an event that no longer exists.
    async fn teardown(&self, namespace: &str, name: &str) -> Result<(), ReconcileError> {
        let params = by_event(namespace, name);
        let store = &self.ctx.store;
        let vm_sets = store.vm_sets.delete_collection(&params).await?;
        let dbcs = store.dbcs.delete_collection(&params).await?;
        let codes = store.access_codes.delete_collection(&params).await?;
        let otacs = store.otacs.delete_collection(&params).await?;
        if vm_sets + dbcs + codes + otacs > 0 {
            info!(event = name, vm_sets, dbcs, codes, otacs, "event gone, removed dependents");
        }
        Ok(())
    }

    /// On-demand events run on dynamic capacity only.
    async fn drop_vm_sets(&self, se: &ScheduledEvent) -> Result<(), ReconcileError> {
        let ns = &se.metadata.namespace;
        for name in &se.status.vm_sets {
            ignore_not_found(self.ctx.store.vm_sets.delete(ns, name).await)?;
        }
        retry::update_status(self.ctx.store.events.as_ref(), ns, se.name(), |cur| {
            if cur.status.vm_sets.is_empty() {
                return false;
            }
            cur.status.vm_sets.clear();
            true
        })
        .await?;
        info!(event = se.name(), "on-demand event, dropped vm sets");
        Ok(())
    }

    async fn provision(&self, se: &ScheduledEvent) -> Result<(), ReconcileError> {
        let ns = se.metadata.namespace.as_str();
        let store = &self.ctx.store;

        let mut vm_sets = Vec::new();
        if !se.spec.on_demand {
            for (env, tmpl, count) in se.required() {
                vm_sets.push(self.ensure_vm_set(se, env, tmpl, count).await?);
            }
        }
        for stale in self
            .ctx
            .informers
            .vm_sets
            .lister()
            .list_in(ns, &Selector::everything().eq(LABEL_SCHEDULED_EVENT, se.name()))
            .into_iter()
            .filter(|s| !vm_sets.iter().any(|n| n == s.name()))
        {
            ignore_not_found(store.vm_sets.delete(ns, stale.name()).await)?;
        }

        store.dbcs.delete_collection(&by_event(ns, se.name())).await?;
        for (env, templates) in &se.spec.required_vms {
            let dbc = DynamicBindConfiguration::new(
                owned_meta(
                    se,
                    naming::dbc_name(se.name(), env),
                    owned_labels(se).with(LABEL_ENVIRONMENT, env.as_str()),
                ),
                DynamicBindConfigurationSpec {
                    environment: env.clone(),
                    base_name: self.ctx.config.dynamic_prefix.clone(),
                    restricted_bind: se.spec.restricted_bind,
                    restricted_bind_value: se.bind_value().to_string(),
                    burst_count_capacity: templates.clone(),
                },
            );
            upsert(store.dbcs.as_ref(), dbc, |cur, want| {
                if cur.spec == want.spec {
                    return false;
                }
                cur.spec = want.spec.clone();
                true
            })
            .await?;
        }

        self.ensure_access_code(se).await?;

        retry::update_status(store.events.as_ref(), ns, se.name(), |cur| {
            let before = cur.status.clone();
            cur.status.provisioned = true;
            cur.status.ready = false;
            cur.status.finished = false;
            cur.status.vm_sets = vm_sets.clone();
            cur.status != before
        })
        .await?;
        info!(event = se.name(), vm_sets = vm_sets.len(), "event provisioned");
        Ok(())
    }

    async fn ensure_vm_set(
        &self,
        se: &ScheduledEvent,
        env: &str,
        tmpl: &str,
        count: u32,
    ) -> Result<String, ReconcileError> {
        let name = naming::vm_set_name(se.name(), env, tmpl);
        let labels = owned_labels(se)
            .with(LABEL_ENVIRONMENT, env)
            .with(template_label(tmpl), "true");
        let set = VirtualMachineSet::new(
            owned_meta(se, name.clone(), labels),
            VirtualMachineSetSpec {
                count,
                environment: env.to_string(),
                vm_template: tmpl.to_string(),
                base_name: self.ctx.config.scheduled_prefix.clone(),
                restricted_bind: se.spec.restricted_bind,
                restricted_bind_value: se.bind_value().to_string(),
            },
        );
        upsert(self.ctx.store.vm_sets.as_ref(), set, |cur, want| {
            if cur.spec == want.spec && cur.metadata.labels == want.metadata.labels {
                return false;
            }
            cur.spec = want.spec.clone();
            cur.metadata.labels = want.metadata.labels.clone();
            true
        })
        .await?;
        Ok(name)
    }

    /// Make sure the event's access code exists and still belongs to it.
    ///
    /// A code whose labels or spec drifted is deleted and created again.
    async fn ensure_access_code(&self, se: &ScheduledEvent) -> Result<(), ReconcileError> {
        let ns = se.metadata.namespace.as_str();
        let code = se.spec.access_code.trim();
        if code.is_empty() {
            return Err(ReconcileError::Validation(format!(
                "event {} has no access code",
                se.name()
            )));
        }
        let desired = AccessCode::new(
            owned_meta(se, code.to_string(), owned_labels(se)),
            AccessCodeSpec {
                code: code.to_string(),
                description: se.spec.description.clone(),
                scenarios: se.spec.scenarios.clone(),
                courses: se.spec.courses.clone(),
                expiration: se.spec.end_time.clone(),
                restricted_bind: se.spec.restricted_bind,
                restricted_bind_value: se.bind_value().to_string(),
                printable: se.spec.printable,
            },
        );

        let api = self.ctx.store.access_codes.as_ref();
        if let Some(cur) = api.get(ns, code).await.optional()? {
            let owned = desired
                .metadata
                .labels
                .iter()
                .all(|(k, v)| cur.labels().has(k, v));
            if owned && cur.spec == desired.spec {
                return Ok(());
            }
            info!(event = se.name(), code, "access code drifted, recreating");
            ignore_not_found(api.delete(ns, code).await)?;
        }
        match api.create(desired).await {
            Err(e) if !e.is_already_exists() => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// `true` once every VMSet of the event reports its full count.
    async fn verify(&self, se: &ScheduledEvent) -> Result<bool, ReconcileError> {
        let ns = se.metadata.namespace.as_str();
        let lister = self.ctx.informers.vm_sets.lister();
        for name in &se.status.vm_sets {
            let Some(set) = lister.get(ns, name) else {
                debug!(event = se.name(), vm_set = %name, "vm set not cached yet");
                return Ok(false);
            };
            if set.status.provisioned < set.spec.count {
                debug!(
                    event = se.name(),
                    vm_set = %name,
                    provisioned = set.status.provisioned,
                    count = set.spec.count,
                    "vm set still provisioning"
                );
                return Ok(false);
            }
        }

        self.ensure_access_code(se).await?;
        retry::update_status(self.ctx.store.events.as_ref(), ns, se.name(), |cur| {
            if cur.status.ready {
                return false;
            }
            cur.status.ready = true;
            true
        })
        .await?;
        info!(event = se.name(), "event ready");
        Ok(true)
    }

    async fn complete(&self, se: &ScheduledEvent, now: OffsetDateTime) -> Result<(), ReconcileError> {
        let ns = se.metadata.namespace.as_str();
        let store = &self.ctx.store;

        let removed = store.vm_sets.delete_collection(&by_event(ns, se.name())).await?;

        let sessions = self.ctx.informers.sessions.lister();
        let mut bound = sessions.list_in(
            ns,
            &Selector::everything().eq(LABEL_ACCESS_CODE, se.spec.access_code.as_str()),
        );
        for otac in self
            .ctx
            .informers
            .otacs
            .lister()
            .list_in(ns, &Selector::everything().eq(LABEL_SCHEDULED_EVENT, se.name()))
        {
            bound.extend(sessions.list_in(
                ns,
                &Selector::everything().eq(LABEL_ONE_TIME_ACCESS_CODE, otac.name()),
            ));
        }
        let expired_at = format_unix_date(now);
        let mut expired = 0usize;
        for session in bound.iter().filter(|s| s.status.active) {
            let res = retry::update_status(store.sessions.as_ref(), ns, session.name(), |cur| {
                if !cur.status.active {
                    return false;
                }
                cur.status.active = false;
                cur.status.expiration_time = expired_at.clone();
                true
            })
            .await;
            if res.optional()?.is_some() {
                expired += 1;
            }
        }

        retry::update_status(store.events.as_ref(), ns, se.name(), |cur| {
            let before = cur.status.clone();
            cur.status.provisioned = true;
            cur.status.ready = false;
            cur.status.finished = true;
            cur.status.active = false;
            cur.status.vm_sets.clear();
            cur.status != before
        })
        .await?;
        info!(event = se.name(), vm_sets = removed, sessions = expired, "event completed");
        Ok(())
    }

    async fn retire(&self, se: &ScheduledEvent) -> Result<(), ReconcileError> {
        let ns = se.metadata.namespace.as_str();
        let progress = self
            .ctx
            .store
            .progress
            .delete_collection(&by_event(ns, se.name()))
            .await?;
        ignore_not_found(self.ctx.store.events.delete(ns, se.name()).await)?;
        self.teardown(ns, se.name()).await?;
        info!(event = se.name(), progress, "retention elapsed, event deleted");
        Ok(())
    }
}

/// Delay until the next time-driven step, padded past the boundary.
fn next_wakeup(
    se: &ScheduledEvent,
    start: OffsetDateTime,
    end: OffsetDateTime,
    retention: Duration,
    now: OffsetDateTime,
) -> Action {
    let st = &se.status;
    let candidates = [
        (st.active && !st.provisioned).then_some(start),
        (st.active && !st.finished).then_some(end),
        st.finished.then_some(end + retention),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter(|at| *at >= now)
        .min()
        .map(|at| {
            let wait = StdDuration::try_from(at - now).unwrap_or_default();
            Action::RequeueAfter(wait + StdDuration::from_secs(1))
        })
        .unwrap_or(Action::Done)
}

#[async_trait]
impl Reconciler for ScheduledEventReconciler {
    fn name(&self) -> &'static str {
        "scheduledevent"
    }

    async fn reconcile(&self, key: &str) -> ReconcileResult {
        let (ns, name) = split_key(key);
        let Some(se) = self.ctx.store.events.get(ns, name).await.optional()? else {
            self.teardown(ns, name).await?;
            return Ok(Action::Done);
        };

        let now = self.ctx.clock.now();
        let start = se.start()?;
        let end = se.end()?;
        let retention = event_retention(
            &self.ctx.informers.settings.lister(),
            ns,
            self.ctx.config.default_retention_hours,
        );

        if se.spec.on_demand && !se.status.vm_sets.is_empty() {
            self.drop_vm_sets(&se).await?;
            return Ok(Action::RequeueAfter(StdDuration::ZERO));
        }

        let st = &se.status;
        if st.active && !st.finished && end < now {
            self.complete(&se, now).await?;
            return Ok(Action::RequeueAfter(StdDuration::ZERO));
        }
        if st.active && !st.provisioned && start < now {
            self.provision(&se).await?;
            return Ok(Action::RequeueAfter(StdDuration::ZERO));
        }
        if st.provisioned && !st.finished && !st.ready {
            if !self.verify(&se).await? {
                return Ok(Action::RequeueAfter(self.ctx.config.verify_requeue));
            }
            return Ok(Action::RequeueAfter(StdDuration::ZERO));
        }
        if st.finished && now > end + retention {
            self.retire(&se).await?;
            return Ok(Action::Done);
        }

        Ok(next_wakeup(&se, start, end, retention, now))
    }
}
