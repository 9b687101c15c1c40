//! `/metrics` and `/healthz`.
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use gargantua_core::informer::SyncSignal;
use gargantua_prometheus::{Encoder, PrometheusMetrics, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct HttpState {
    pub metrics: PrometheusMetrics,
    /// Healthy once every informer cache has synced.
    pub sync: Vec<SyncSignal>,
}

pub fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Serve until `cancel` fires.
pub async fn serve(listener: TcpListener, state: Arc<HttpState>, cancel: CancellationToken) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http listening");
    }
    let res = axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await;
    if let Err(e) = res {
        warn!(error = %e, "http server stopped");
    }
}

async fn metrics(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn healthz(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    if state.sync.iter().all(SyncSignal::is_synced) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "caches not synced")
    }
}

#[cfg(test)]
mod tests {
    use gargantua_core::{
        clock::system_clock, informer::InformerSet, metrics::MetricsBackend, store::Store,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    async fn get(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(req.as_bytes()).await.unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn healthz_follows_cache_sync_and_metrics_are_exposed() {
        let store = Store::in_memory(system_clock());
        let informers = InformerSet::new(&store, "labs");
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_requeue("vmclaim", "conflict");

        let state = Arc::new(HttpState {
            metrics,
            sync: informers.sync_signals(),
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        tokio::spawn(serve(listener, state, cancel.clone()));

        assert!(get(addr, "/healthz").await.starts_with("HTTP/1.1 503"));

        informers.spawn(&cancel);
        assert!(informers.wait_synced(&cancel).await);
        assert!(get(addr, "/healthz").await.starts_with("HTTP/1.1 200"));

        let body = get(addr, "/metrics").await;
        assert!(body.contains(r#"gargantua_requeue_total{controller="vmclaim",reason="conflict"} 1"#));

        cancel.cancel();
    }
}
