use std::sync::Arc;

use taskvisor::Subscribe;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gargantua_controllers::{Context, Controllers};
use gargantua_core::{
    SupervisorApi,
    clock::system_clock,
    informer::InformerSet,
    metrics::MetricsHandle,
    store::Store,
    supervisor::{ControllerConfig as SlotConfig, SupervisorConfig},
};
use gargantua_observe::{SupervisorLog, init_logger};
use gargantua_prometheus::PrometheusMetrics;

mod config;
mod http;

use config::AgentConfig;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // 1) config + logger
    let cfg = AgentConfig::from_env()?;
    init_logger(&cfg.log)?;
    info!(
        namespace = %cfg.controllers.namespace,
        shard = %cfg.controllers.shard,
        cost_kinds = cfg.cost_targets.len(),
        "configuration loaded"
    );

    // 2) metrics
    let metrics = PrometheusMetrics::new()?;
    let handle: MetricsHandle = Arc::new(metrics.clone());

    // 3) store, informers, controllers
    let clock = system_clock();
    let store = Store::in_memory(clock.clone());
    let informers = InformerSet::new(&store, &cfg.controllers.namespace);
    let ctx = Context::new(store, informers, clock, cfg.controllers.clone(), handle);
    let controllers = Controllers::new(ctx.clone(), &cfg.cost_targets)?;

    // 4) supervisor
    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(SupervisorLog)];
    let api = SupervisorApi::new(SupervisorConfig::default(), SlotConfig::default(), subscribers)
        .await?;
    for unit in ctx.informers.runnables() {
        api.submit_long_running(unit).await?;
    }
    for unit in controllers.runnables() {
        api.submit_long_running(unit).await?;
    }

    // 5) http
    let cancel = CancellationToken::new();
    let listener = TcpListener::bind(cfg.metrics_addr).await?;
    let state = Arc::new(http::HttpState {
        metrics,
        sync: ctx.informers.sync_signals(),
    });
    let server = tokio::spawn(http::serve(listener, state, cancel.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    if let Err(e) = api.shutdown().await {
        warn!(error = %e, "supervisor shutdown incomplete");
    }
    cancel.cancel();
    server.await?;
    Ok(())
}
