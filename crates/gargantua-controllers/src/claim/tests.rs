use gargantua_core::runtime::{Action, ReconcileError, Reconciler};
use gargantua_model::{
    BindMode, LABEL_BOUND, LABEL_RESTRICTED_BIND, LABEL_RESTRICTED_BIND_VALUE,
    LABEL_SCHEDULED_EVENT, Resource, TRUE, VirtualMachine, VmPhase,
};
use time::Duration;

use super::VmClaimReconciler;
use crate::{
    naming,
    testing::{Api, Harness, NS},
};

async fn vm(h: &Harness, name: &str) -> VirtualMachine {
    h.ctx.store.vms.get(NS, name).await.unwrap()
}

async fn run_vm(h: &Harness, name: &str) {
    let mut v = vm(h, name).await;
    v.status.phase = VmPhase::Running;
    h.ctx.store.vms.update_status(v).await.unwrap();
}

/// Event `se-1` with code `se-1-code`, already started.
async fn event(h: &Harness, required: &[(&str, &str, u32)]) {
    h.event("se-1", Duration::minutes(-5), Duration::hours(2), required, |_| {})
        .await;
    h.access_code("se-1-code", "se-1").await;
}

/// Same as [`event`] but the event keeps its VMs to itself.
async fn restricted_event(h: &Harness, required: &[(&str, &str, u32)]) {
    h.event("se-1", Duration::minutes(-5), Duration::hours(2), required, |s| {
        s.restricted_bind = true;
    })
    .await;
    h.access_code("se-1-code", "se-1").await;
}

/// Move a VM into the bind domain `value`.
async fn restrict_vm(h: &Harness, name: &str, value: &str) {
    let mut v = vm(h, name).await;
    v.metadata.labels.insert(LABEL_RESTRICTED_BIND, TRUE);
    v.metadata.labels.insert(LABEL_RESTRICTED_BIND_VALUE, value);
    h.ctx.store.vms.update(v).await.unwrap();
}

async fn slot_vm(h: &Harness, claim: &str, slot: &str) -> Option<String> {
    let claim = h.ctx.store.claims.get(NS, claim).await.unwrap();
    claim
        .spec
        .virtual_machines
        .get(slot)
        .filter(|s| s.is_assigned())
        .map(|s| s.vm_id.clone())
}

#[tokio::test]
async fn dynamic_claim_splits_across_environments() {
    let h = Harness::new().await;
    h.environment("env-a", &[("tmpl-x", 10)]).await;
    h.environment("env-b", &[("tmpl-y", 10)]).await;
    event(&h, &[("env-a", "tmpl-x", 1), ("env-b", "tmpl-y", 1)]).await;
    h.dbc("d-a", "se-1", "env-a", &[("tmpl-x", 1)]).await;
    h.dbc("d-b", "se-1", "env-b", &[("tmpl-y", 1)]).await;
    h.session("sess-1", "se-1-code").await;
    h.claim("c-1", "se-1-code", "sess-1", &[("web", "tmpl-x"), ("db", "tmpl-y")], |_| {})
        .await;
    h.settle().await;

    let r = VmClaimReconciler::new(h.ctx.clone());
    assert_eq!(r.reconcile("labs/c-1").await.unwrap(), Action::Done);

    let web = vm(&h, "dynamic-c-1-web").await;
    let db = vm(&h, "dynamic-c-1-db").await;
    assert_eq!(web.status.environment_id, "env-a");
    assert_eq!(db.status.environment_id, "env-b");
    assert_eq!(web.spec.vm_claim_id, "c-1");
    assert!(web.status.allocated);
    assert!(web.labels().flag(LABEL_BOUND));
    assert!(web.labels().has(LABEL_SCHEDULED_EVENT, "se-1"));
    assert!(web.spec.provision);

    let claim = h.ctx.store.claims.get(NS, "c-1").await.unwrap();
    assert!(claim.status.bound);
    assert!(!claim.status.ready);
    assert_eq!(
        claim.spec.virtual_machines.get("web").map(|s| s.vm_id.as_str()),
        Some("dynamic-c-1-web")
    );
    assert_eq!(
        claim.spec.virtual_machines.get("db").map(|s| s.vm_id.as_str()),
        Some("dynamic-c-1-db")
    );
}

#[tokio::test]
async fn bound_claim_turns_ready_when_vms_run() {
    let h = Harness::new().await;
    h.environment("env-a", &[("tmpl-x", 10)]).await;
    event(&h, &[("env-a", "tmpl-x", 2)]).await;
    h.dbc("d-a", "se-1", "env-a", &[("tmpl-x", 2)]).await;
    h.session("sess-1", "se-1-code").await;
    h.claim("c-1", "se-1-code", "sess-1", &[("a", "tmpl-x"), ("b", "tmpl-x")], |_| {})
        .await;
    h.settle().await;

    let r = VmClaimReconciler::new(h.ctx.clone());
    r.reconcile("labs/c-1").await.unwrap();
    h.settle().await;

    run_vm(&h, "dynamic-c-1-a").await;
    h.settle().await;
    assert_eq!(
        r.reconcile("labs/c-1").await.unwrap(),
        Action::RequeueAfter(h.ctx.config.ready_poll)
    );

    run_vm(&h, "dynamic-c-1-b").await;
    h.settle().await;
    assert_eq!(r.reconcile("labs/c-1").await.unwrap(), Action::Done);
    let claim = h.ctx.store.claims.get(NS, "c-1").await.unwrap();
    assert!(claim.status.ready);

    // Settled: further passes write nothing.
    let rv = claim.metadata.resource_version;
    r.reconcile("labs/c-1").await.unwrap();
    assert_eq!(
        h.ctx.store.claims.get(NS, "c-1").await.unwrap().metadata.resource_version,
        rv
    );
}

#[tokio::test]
async fn concurrent_claims_never_overbook() {
    let h = Harness::new().await;
    h.environment("env-a", &[("tmpl-x", 3)]).await;
    event(&h, &[("env-a", "tmpl-x", 3)]).await;
    h.dbc("d-a", "se-1", "env-a", &[("tmpl-x", 3)]).await;
    for (claim, session) in [("c-1", "s-1"), ("c-2", "s-2")] {
        h.session(session, "se-1-code").await;
        h.claim(claim, "se-1-code", session, &[("a", "tmpl-x"), ("b", "tmpl-x")], |_| {})
            .await;
    }
    h.settle().await;

    let r = VmClaimReconciler::new(h.ctx.clone());
    let (one, two) = tokio::join!(r.reconcile("labs/c-1"), r.reconcile("labs/c-2"));

    let failures = [&one, &two]
        .iter()
        .filter(|res| matches!(res, Err(ReconcileError::Capacity(_))))
        .count();
    assert_eq!(failures, 1);
    assert_eq!(
        h.ctx
            .store
            .vms
            .list(&gargantua_core::store::ListParams::default())
            .await
            .unwrap()
            .items
            .len(),
        2
    );

    let (loser, session) = if one.is_err() { ("c-1", "s-1") } else { ("c-2", "s-2") };
    let claim = h.ctx.store.claims.get(NS, loser).await.unwrap();
    assert!(claim.status.tainted);
    assert!(!claim.status.bound);
    let s = h.ctx.store.sessions.get(NS, session).await.unwrap();
    assert!(s.status.finished);
    assert!(!s.status.active);

    // The tainted claim is deleted on its next pass.
    assert_eq!(r.reconcile(&format!("labs/{loser}")).await.unwrap(), Action::Done);
    assert!(h.ctx.store.claims.get(NS, loser).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn static_bind_rolls_back_partial_assignment() {
    let h = Harness::new().await;
    h.environment("env-a", &[("tmpl-1", 5), ("tmpl-2", 5), ("tmpl-3", 5)]).await;
    event(&h, &[("env-a", "tmpl-1", 1), ("env-a", "tmpl-2", 1), ("env-a", "tmpl-3", 1)]).await;
    h.free_vm("vm-1", "env-a", "tmpl-1", VmPhase::Running).await;
    h.free_vm("vm-2", "env-a", "tmpl-2", VmPhase::Running).await;
    h.session("sess-1", "se-1-code").await;
    h.claim(
        "c-1",
        "se-1-code",
        "sess-1",
        &[("one", "tmpl-1"), ("two", "tmpl-2"), ("three", "tmpl-3")],
        |c| {
            c.status.bind_mode = BindMode::Static;
            c.spec.dynamic_capable = false;
        },
    )
    .await;
    h.settle().await;

    let r = VmClaimReconciler::new(h.ctx.clone());
    assert_eq!(
        r.reconcile("labs/c-1").await.unwrap(),
        Action::RequeueAfter(h.ctx.config.static_bind_retry)
    );

    for name in ["vm-1", "vm-2"] {
        let v = vm(&h, name).await;
        assert!(!v.labels().flag(LABEL_BOUND), "{name} still bound");
        assert!(v.spec.vm_claim_id.is_empty());
        assert!(!v.status.allocated);
    }
    let claim = h.ctx.store.claims.get(NS, "c-1").await.unwrap();
    assert_eq!(claim.status.static_bind_attempts, 1);
    assert!(!claim.status.bound);
    assert_eq!(claim.spec.virtual_machines.vm_ids().count(), 0);

    h.settle().await;
    r.reconcile("labs/c-1").await.unwrap();
    h.settle().await;
    r.reconcile("labs/c-1").await.unwrap();
    h.settle().await;

    // Threshold reached and the claim cannot go dynamic.
    assert!(matches!(
        r.reconcile("labs/c-1").await,
        Err(ReconcileError::Capacity(_))
    ));
    assert!(h.ctx.store.claims.get(NS, "c-1").await.unwrap().status.tainted);
}

#[tokio::test]
async fn static_bind_prefers_running_vms() {
    let h = Harness::new().await;
    h.environment("env-a", &[("tmpl-1", 5)]).await;
    event(&h, &[("env-a", "tmpl-1", 2)]).await;
    h.free_vm("vm-a", "env-a", "tmpl-1", VmPhase::Provisioned).await;
    h.free_vm("vm-b", "env-a", "tmpl-1", VmPhase::Running).await;
    h.session("sess-1", "se-1-code").await;
    h.claim("c-1", "se-1-code", "sess-1", &[("one", "tmpl-1")], |c| {
        c.status.bind_mode = BindMode::Static;
    })
    .await;
    h.settle().await;

    let r = VmClaimReconciler::new(h.ctx.clone());
    assert_eq!(r.reconcile("labs/c-1").await.unwrap(), Action::Done);

    let claim = h.ctx.store.claims.get(NS, "c-1").await.unwrap();
    assert!(claim.status.bound);
    assert_eq!(
        claim.spec.virtual_machines.get("one").map(|s| s.vm_id.as_str()),
        Some("vm-b")
    );
    let taken = vm(&h, "vm-b").await;
    assert!(taken.status.allocated);
    assert_eq!(taken.spec.user_id, "u-1");
    assert!(!vm(&h, "vm-a").await.status.allocated);
}

#[tokio::test]
async fn exhausted_static_claim_falls_back_to_dynamic() {
    let h = Harness::new().await;
    h.environment("env-a", &[("tmpl-1", 5)]).await;
    event(&h, &[("env-a", "tmpl-1", 1)]).await;
    h.dbc("d-a", "se-1", "env-a", &[("tmpl-1", 2)]).await;
    h.session("sess-1", "se-1-code").await;
    h.claim("c-1", "se-1-code", "sess-1", &[("one", "tmpl-1")], |c| {
        c.status.bind_mode = BindMode::Static;
        c.status.static_bind_attempts = 3;
    })
    .await;
    h.settle().await;

    let r = VmClaimReconciler::new(h.ctx.clone());
    assert_eq!(r.reconcile("labs/c-1").await.unwrap(), Action::Done);

    let claim = h.ctx.store.claims.get(NS, "c-1").await.unwrap();
    assert_eq!(claim.status.bind_mode, BindMode::Dynamic);
    assert!(claim.status.bound);
    let name = naming::dynamic_vm_name("dynamic", "c-1", "one");
    assert_eq!(vm(&h, &name).await.spec.vm_claim_id, "c-1");
}

#[tokio::test]
async fn claim_without_access_code_is_rejected() {
    let h = Harness::new().await;
    h.claim("c-1", "", "sess-1", &[("one", "tmpl-1")], |c| {
        c.metadata.labels.remove(gargantua_model::LABEL_ACCESS_CODE);
    })
    .await;
    let r = VmClaimReconciler::new(h.ctx.clone());
    assert!(matches!(
        r.reconcile("labs/c-1").await,
        Err(ReconcileError::Validation(_))
    ));

    // Missing claims are a no-op.
    assert_eq!(r.reconcile("labs/nope").await.unwrap(), Action::Done);
}

#[tokio::test]
async fn static_bind_keeps_filled_slots() {
    let h = Harness::new().await;
    h.environment("env-a", &[("tmpl-1", 5)]).await;
    event(&h, &[("env-a", "tmpl-1", 3)]).await;
    h.free_vm("vm-a", "env-a", "tmpl-1", VmPhase::Running).await;
    h.free_vm("vm-b", "env-a", "tmpl-1", VmPhase::Provisioned).await;
    h.free_vm("vm-pre", "env-a", "tmpl-1", VmPhase::Running).await;
    h.session("sess-1", "se-1-code").await;
    h.claim("c-1", "se-1-code", "sess-1", &[("one", "tmpl-1"), ("two", "tmpl-1")], |c| {
        c.status.bind_mode = BindMode::Static;
        c.spec.virtual_machines.assign("one", "vm-pre");
    })
    .await;
    h.settle().await;

    let r = VmClaimReconciler::new(h.ctx.clone());
    assert_eq!(r.reconcile("labs/c-1").await.unwrap(), Action::Done);

    assert_eq!(slot_vm(&h, "c-1", "one").await.as_deref(), Some("vm-pre"));
    assert_eq!(slot_vm(&h, "c-1", "two").await.as_deref(), Some("vm-a"));
    assert!(h.ctx.store.claims.get(NS, "c-1").await.unwrap().status.bound);
    assert!(vm(&h, "vm-a").await.status.allocated);
    for name in ["vm-b", "vm-pre"] {
        let v = vm(&h, name).await;
        assert!(!v.labels().flag(LABEL_BOUND), "{name} taken");
        assert!(v.spec.vm_claim_id.is_empty());
    }
}

#[tokio::test]
async fn dynamic_bind_places_only_open_slots() {
    let h = Harness::new().await;
    h.environment("env-a", &[("tmpl-x", 10)]).await;
    event(&h, &[("env-a", "tmpl-x", 2)]).await;
    h.dbc("d-a", "se-1", "env-a", &[("tmpl-x", 5)]).await;
    h.session("sess-1", "se-1-code").await;
    h.claim("c-1", "se-1-code", "sess-1", &[("web", "tmpl-x"), ("db", "tmpl-x")], |c| {
        c.spec.virtual_machines.assign("web", "vm-pre");
    })
    .await;
    h.settle().await;

    let r = VmClaimReconciler::new(h.ctx.clone());
    assert_eq!(r.reconcile("labs/c-1").await.unwrap(), Action::Done);

    assert_eq!(slot_vm(&h, "c-1", "web").await.as_deref(), Some("vm-pre"));
    assert_eq!(slot_vm(&h, "c-1", "db").await.as_deref(), Some("dynamic-c-1-db"));
    assert!(
        h.ctx
            .store
            .vms
            .get(NS, "dynamic-c-1-web")
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert_eq!(h.ctx.capacity.count("tmpl-x", "env-a"), 1);
}

#[tokio::test]
async fn static_bind_stays_inside_event_domain() {
    let h = Harness::new().await;
    h.environment("env-a", &[("tmpl-1", 5)]).await;
    restricted_event(&h, &[("env-a", "tmpl-1", 2)]).await;
    h.free_vm("vm-foreign", "env-a", "tmpl-1", VmPhase::Running).await;
    restrict_vm(&h, "vm-foreign", "se-2").await;
    h.free_vm("vm-open", "env-a", "tmpl-1", VmPhase::Running).await;
    h.free_vm("vm-own", "env-a", "tmpl-1", VmPhase::Provisioned).await;
    restrict_vm(&h, "vm-own", "se-1").await;
    for (claim, session) in [("c-1", "s-1"), ("c-2", "s-2")] {
        h.session(session, "se-1-code").await;
        h.claim(claim, "se-1-code", session, &[("one", "tmpl-1")], |c| {
            c.status.bind_mode = BindMode::Static;
            c.spec.dynamic_capable = false;
        })
        .await;
    }
    h.settle().await;

    let r = VmClaimReconciler::new(h.ctx.clone());
    assert_eq!(r.reconcile("labs/c-1").await.unwrap(), Action::Done);
    assert_eq!(slot_vm(&h, "c-1", "one").await.as_deref(), Some("vm-own"));
    h.settle().await;

    // Only VMs of other domains are left.
    assert_eq!(
        r.reconcile("labs/c-2").await.unwrap(),
        Action::RequeueAfter(h.ctx.config.static_bind_retry)
    );
    assert_eq!(slot_vm(&h, "c-2", "one").await, None);
    for name in ["vm-foreign", "vm-open"] {
        let v = vm(&h, name).await;
        assert!(!v.labels().flag(LABEL_BOUND), "{name} taken");
        assert!(v.spec.vm_claim_id.is_empty());
        assert!(!v.status.allocated);
    }
}

#[tokio::test]
async fn dynamic_bind_uses_only_dbcs_of_event_domain() {
    let h = Harness::new().await;
    h.environment("env-a", &[("tmpl-x", 10)]).await;
    h.environment("env-b", &[("tmpl-x", 10)]).await;
    restricted_event(&h, &[("env-a", "tmpl-x", 1), ("env-b", "tmpl-x", 1)]).await;
    // Listed first; it would take the claim if domains were ignored.
    h.dbc("d-a", "se-1", "env-b", &[("tmpl-x", 5)]).await;
    h.dbc("d-b", "se-1", "env-a", &[("tmpl-x", 5)]).await;
    for (name, value) in [("d-a", "se-2"), ("d-b", "se-1")] {
        let mut dbc = h.ctx.store.dbcs.get(NS, name).await.unwrap();
        dbc.spec.restricted_bind = true;
        dbc.spec.restricted_bind_value = value.into();
        h.ctx.store.dbcs.update(dbc).await.unwrap();
    }
    h.session("sess-1", "se-1-code").await;
    h.claim("c-1", "se-1-code", "sess-1", &[("web", "tmpl-x")], |_| {})
        .await;
    h.settle().await;

    let r = VmClaimReconciler::new(h.ctx.clone());
    assert_eq!(r.reconcile("labs/c-1").await.unwrap(), Action::Done);

    let web = vm(&h, "dynamic-c-1-web").await;
    assert_eq!(web.status.environment_id, "env-a");
    assert!(web.labels().flag(LABEL_RESTRICTED_BIND));
    assert!(web.labels().has(LABEL_RESTRICTED_BIND_VALUE, "se-1"));
    assert_eq!(h.ctx.capacity.count("tmpl-x", "env-b"), 0);
}

#[tokio::test]
async fn released_slots_only_drop_their_own_vms() {
    let h = Harness::new().await;
    h.claim("c-1", "se-1-code", "sess-1", &[("one", "tmpl-1"), ("two", "tmpl-1")], |c| {
        c.spec.virtual_machines.assign("one", "vm-a");
        c.spec.virtual_machines.assign("two", "vm-other");
    })
    .await;

    let r = VmClaimReconciler::new(h.ctx.clone());
    let written = vec![
        ("one".to_string(), "vm-a".to_string()),
        ("two".to_string(), "vm-b".to_string()),
    ];
    r.release_slots(NS, "c-1", &written).await.unwrap();

    assert_eq!(slot_vm(&h, "c-1", "one").await, None);
    assert_eq!(slot_vm(&h, "c-1", "two").await.as_deref(), Some("vm-other"));

    // A claim deleted in the meantime has nothing to release.
    r.release_slots(NS, "gone", &written).await.unwrap();
}
