//! Cost accounting over a runtime-configured set of kinds.
//!
//! Objects labelled `cost-group` are recorded in the Cost named by the group,
//! priced by their `base-price` and `time-unit` labels. Removing the object
//! (or its label) stamps the entry's deletion time. Queue keys are
//! `namespace/group/kind/name` so deletions can be recorded after the object
//! is gone.
use std::{collections::HashMap, path::Path, sync::Arc};

use async_trait::async_trait;
use gargantua_core::{
    informer::{InformerSet, MetaInformer, Notification},
    retry,
    runtime::{Action, QueueHandle, ReconcileError, ReconcileResult, Reconciler},
    store::OptionalExt,
};
use gargantua_model::{
    Cost, CostResource, CostSpec, LABEL_BASE_PRICE, LABEL_COST_GROUP, LABEL_TIME_UNIT, ObjectMeta,
    TimeUnit, cost::parse_base_price,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::context::Context;

/// One entry of the cost resource list: `{"group", "version", "resource"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CostTarget {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    /// Lowercase plural, e.g. `virtualmachines`.
    pub resource: String,
}

#[derive(Debug, Error)]
pub enum CostConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("parse cost resource list: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown cost resource {0:?}")]
    UnknownResource(String),
}

/// Parse the cost resource list.
pub fn parse_targets(json: &str) -> Result<Vec<CostTarget>, CostConfigError> {
    Ok(serde_json::from_str(json)?)
}

/// Read the cost resource list from `path`.
pub fn load_targets(path: &Path) -> Result<Vec<CostTarget>, CostConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CostConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_targets(&raw)
}

/// Decoded queue key.
#[derive(Debug, PartialEq, Eq)]
struct CostKey<'a> {
    namespace: &'a str,
    group: &'a str,
    kind: &'a str,
    name: &'a str,
}

impl<'a> CostKey<'a> {
    fn parse(key: &'a str) -> Option<Self> {
        let mut parts = key.splitn(4, '/');
        let key = CostKey {
            namespace: parts.next()?,
            group: parts.next()?,
            kind: parts.next()?,
            name: parts.next()?,
        };
        (!key.group.is_empty() && !key.name.is_empty()).then_some(key)
    }
}

pub fn cost_key(meta: &ObjectMeta, group: &str, kind: &str) -> String {
    format!("{}/{group}/{kind}/{}", meta.namespace, meta.name)
}

pub struct CostReconciler {
    ctx: Arc<Context>,
    kinds: HashMap<&'static str, Arc<dyn MetaInformer>>,
}

impl CostReconciler {
    /// Resolve every target against the informer set.
    pub fn new(
        ctx: Arc<Context>,
        informers: &InformerSet,
        targets: &[CostTarget],
    ) -> Result<Self, CostConfigError> {
        let mut kinds = HashMap::new();
        for t in targets {
            let informer = informers
                .by_plural(&t.resource)
                .ok_or_else(|| CostConfigError::UnknownResource(t.resource.clone()))?;
            kinds.insert(informer.kind(), informer);
        }
        Ok(Self { ctx, kinds })
    }

    /// Enqueue cost keys for every change to a watched kind.
    pub fn watch(&self, queue: QueueHandle) {
        for informer in self.kinds.values() {
            let queue = queue.clone();
            informer.add_meta_handler(Arc::new(move |kind: &'static str, n: Notification<'_, ObjectMeta>| {
                let group = |m: &ObjectMeta| m.labels.get(LABEL_COST_GROUP).map(str::to_string);
                match n {
                    Notification::Added(m) | Notification::Deleted(m) => {
                        if let Some(g) = group(m) {
                            queue.add(cost_key(m, &g, kind));
                        }
                    }
                    Notification::Updated { old, new } => {
                        let (before, after) = (group(old), group(new));
                        if let Some(g) = &after {
                            queue.add(cost_key(new, g, kind));
                        }
                        if let Some(g) = before.filter(|b| after.as_ref() != Some(b)) {
                            queue.add(cost_key(old, &g, kind));
                        }
                    }
                }
            }));
        }
    }

    async fn record(
        &self,
        namespace: &str,
        group: &str,
        mut change: impl FnMut(&mut CostSpec) -> bool + Send,
        create_missing: bool,
    ) -> Result<(), ReconcileError> {
        let api = self.ctx.store.costs.as_ref();
        if api.get(namespace, group).await.optional()?.is_none() {
            if !create_missing {
                return Ok(());
            }
            let mut spec = CostSpec {
                cost_group: group.to_string(),
                resources: Vec::new(),
            };
            change(&mut spec);
            let cost = Cost::new(ObjectMeta::named(group).in_namespace(namespace), spec);
            match api.create(cost).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_already_exists() => {}
                Err(e) => return Err(e.into()),
            }
        }
        retry::update_spec(api, namespace, group, |cur| change(&mut cur.spec)).await?;
        Ok(())
    }
}

/// Both pricing labels are required; an object missing either is not recorded.
fn priced(meta: &ObjectMeta, kind: &str) -> Result<CostResource, ReconcileError> {
    let label = |name: &str| {
        meta.labels.get(name).ok_or_else(|| {
            ReconcileError::Validation(format!("{kind} {} lacks the {name} label", meta.name))
        })
    };
    let base_price = parse_base_price(label(LABEL_BASE_PRICE)?)?;
    let time_unit = label(LABEL_TIME_UNIT)?.parse::<TimeUnit>()?;
    Ok(CostResource {
        id: meta.name.clone(),
        kind: kind.to_string(),
        base_price,
        time_unit,
        creation_unix_timestamp: meta.creation_unix(),
        deletion_unix_timestamp: 0,
    })
}

#[async_trait]
impl Reconciler for CostReconciler {
    fn name(&self) -> &'static str {
        "cost"
    }

    async fn reconcile(&self, key: &str) -> ReconcileResult {
        let Some(k) = CostKey::parse(key) else {
            return Err(ReconcileError::Validation(format!("malformed cost key {key:?}")));
        };
        let Some(informer) = self.kinds.get(k.kind) else {
            return Err(ReconcileError::Validation(format!("kind {} is not cost-tracked", k.kind)));
        };

        match informer.get_meta(k.namespace, k.name) {
            Some(meta) if meta.labels.has(LABEL_COST_GROUP, k.group) => {
                let resource = priced(&meta, k.kind)?;
                debug!(group = k.group, kind = k.kind, id = k.name, "recording cost resource");
                self.record(k.namespace, k.group, |spec| spec.upsert(resource.clone()), true)
                    .await?;
            }
            _ => {
                let now = self.ctx.clock.now_unix();
                self.record(
                    k.namespace,
                    k.group,
                    |spec| spec.mark_deleted(k.kind, k.name, now),
                    false,
                )
                .await?;
                info!(group = k.group, kind = k.kind, id = k.name, "cost resource closed");
            }
        }
        Ok(Action::Done)
    }
}

#[cfg(test)]
mod tests {
    use gargantua_model::{
        CostView, Labels, Resource, VirtualMachine, VirtualMachineSpec, cost::duration_cost,
    };
    use time::Duration;

    use super::*;
    use crate::testing::{Api, Harness, NS};

    fn targets() -> Vec<CostTarget> {
        parse_targets(r#"[{"group":"hobbyfarm.io","version":"v1","resource":"virtualmachines"}]"#)
            .unwrap()
    }

    async fn priced_vm(h: &Harness, name: &str, price: &str, unit: &str) -> VirtualMachine {
        let vm = VirtualMachine::new(
            ObjectMeta::named(name).in_namespace(NS).with_labels(
                Labels::new()
                    .with(LABEL_COST_GROUP, "red")
                    .with(LABEL_BASE_PRICE, price)
                    .with(LABEL_TIME_UNIT, unit),
            ),
            VirtualMachineSpec::default(),
        );
        h.ctx.store.vms.create(vm).await.unwrap()
    }

    fn key(vm: &VirtualMachine) -> String {
        cost_key(vm.meta(), "red", "VirtualMachine")
    }

    #[test]
    fn key_roundtrip_and_rejects_short_keys() {
        let meta = ObjectMeta::named("vm-1").in_namespace("labs");
        let key = cost_key(&meta, "red", "VirtualMachine");
        assert_eq!(key, "labs/red/VirtualMachine/vm-1");
        assert_eq!(
            CostKey::parse(&key),
            Some(CostKey {
                namespace: "labs",
                group: "red",
                kind: "VirtualMachine",
                name: "vm-1"
            })
        );
        assert_eq!(CostKey::parse("labs/vm-1"), None);
    }

    #[test]
    fn target_list_parses() {
        assert_eq!(targets()[0].resource, "virtualmachines");
        assert!(parse_targets("{").is_err());
    }

    #[tokio::test]
    async fn unknown_target_is_a_config_error() {
        let h = Harness::new().await;
        let bad = parse_targets(r#"[{"group":"x","version":"v1","resource":"widgets"}]"#).unwrap();
        assert!(matches!(
            CostReconciler::new(h.ctx.clone(), &h.ctx.informers, &bad),
            Err(CostConfigError::UnknownResource(r)) if r == "widgets"
        ));
    }

    #[tokio::test]
    async fn mixed_duration_report() {
        let h = Harness::new().await;
        let r = CostReconciler::new(h.ctx.clone(), &h.ctx.informers, &targets()).unwrap();

        let secs = priced_vm(&h, "vm-s", "1", "seconds").await;
        let mins = priced_vm(&h, "vm-m", "10", "minutes").await;
        let hours = priced_vm(&h, "vm-h", "50", "hours").await;
        h.settle().await;
        for vm in [&secs, &mins, &hours] {
            r.reconcile(&key(vm)).await.unwrap();
        }

        // Deleted after 10 s, 61 s and 2 h.
        for (wait, vm) in [(10, &secs), (51, &mins), (7139, &hours)] {
            h.clock.advance(Duration::seconds(wait));
            h.ctx.store.vms.delete(NS, vm.name()).await.unwrap();
            h.settle().await;
            r.reconcile(&key(vm)).await.unwrap();
        }

        let live = priced_vm(&h, "vm-live", "50", "hours").await;
        h.settle().await;
        r.reconcile(&key(&live)).await.unwrap();
        h.clock.advance(Duration::seconds(10));

        let cost = h.ctx.store.costs.get(NS, "red").await.unwrap();
        assert_eq!(cost.spec.resources.len(), 4);

        let now = h.clock_now().unix_timestamp();
        assert_eq!(cost.report(CostView::Historic, now).total, 130.0);
        assert_eq!(cost.report(CostView::Present, now).total, 50.0);
        let all = cost.report(CostView::All, now);
        assert_eq!(all.total, 180.0);
        assert_eq!(all.sources[0].count, 4);
    }

    #[tokio::test]
    async fn repeat_reconcile_does_not_rewrite() {
        let h = Harness::new().await;
        let r = CostReconciler::new(h.ctx.clone(), &h.ctx.informers, &targets()).unwrap();
        let vm = priced_vm(&h, "vm-a", "2", "minutes").await;
        h.settle().await;

        r.reconcile(&key(&vm)).await.unwrap();
        let rv = h.ctx.store.costs.get(NS, "red").await.unwrap().metadata.resource_version;
        r.reconcile(&key(&vm)).await.unwrap();
        assert_eq!(
            h.ctx.store.costs.get(NS, "red").await.unwrap().metadata.resource_version,
            rv
        );
        assert_eq!(duration_cost(2.0, TimeUnit::Minutes, 61), 4.0);
    }

    #[tokio::test]
    async fn bad_price_is_skipped() {
        let h = Harness::new().await;
        let r = CostReconciler::new(h.ctx.clone(), &h.ctx.informers, &targets()).unwrap();
        let vm = priced_vm(&h, "vm-a", "cheap", "minutes").await;
        h.settle().await;

        assert!(matches!(
            r.reconcile(&key(&vm)).await,
            Err(ReconcileError::Validation(_))
        ));
        assert!(h.ctx.store.costs.get(NS, "red").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn incomplete_cost_labels_are_skipped() {
        let h = Harness::new().await;
        let r = CostReconciler::new(h.ctx.clone(), &h.ctx.informers, &targets()).unwrap();
        for (name, missing) in [("vm-a", LABEL_TIME_UNIT), ("vm-b", LABEL_BASE_PRICE)] {
            let mut vm = VirtualMachine::new(
                ObjectMeta::named(name).in_namespace(NS).with_labels(
                    Labels::new()
                        .with(LABEL_COST_GROUP, "red")
                        .with(LABEL_BASE_PRICE, "1")
                        .with(LABEL_TIME_UNIT, "hours"),
                ),
                VirtualMachineSpec::default(),
            );
            vm.metadata.labels.remove(missing);
            let vm = h.ctx.store.vms.create(vm).await.unwrap();
            h.settle().await;

            assert!(matches!(
                r.reconcile(&key(&vm)).await,
                Err(ReconcileError::Validation(_))
            ));
        }
        assert!(h.ctx.store.costs.get(NS, "red").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn handlers_enqueue_group_keys() {
        let h = Harness::new().await;
        let r = CostReconciler::new(h.ctx.clone(), &h.ctx.informers, &targets()).unwrap();
        let controller = gargantua_core::runtime::Controller::new(
            Arc::new(r),
            Default::default(),
            gargantua_core::metrics::noop_metrics(),
        );
        controller.reconciler().watch(controller.handle());

        priced_vm(&h, "vm-a", "1", "hours").await;
        h.settle().await;
        assert_eq!(controller.handle().len(), 1);
    }
}
