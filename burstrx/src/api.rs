use crate::inspect::FirewallStats;
use crate::stats::{PollerStats, StatsSnapshot};
use axum::{
    extract::{ConnectInfo, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use ipnet::IpNet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub poller: Arc<PollerStats>,
    pub firewall: Arc<FirewallStats>,
    pub start_time: Instant,
}

// ── Prometheus Metrics ────────────────────────────────────────────────────────

struct Metrics {
    registry: Registry,
    packets_total: Counter,
    bytes_total: Counter,
    invalid_packets_total: Counter,
    malformed_batches_total: Counter,
    dropped_total: Counter,
}

impl Metrics {
    fn new() -> Self {
        let mut registry = Registry::default();
        let packets_total = Counter::default();
        let bytes_total = Counter::default();
        let invalid_packets_total = Counter::default();
        let malformed_batches_total = Counter::default();
        let dropped_total = Counter::default();

        registry.register(
            "burstrx_packets",
            "Packets reported by accepted batches",
            packets_total.clone(),
        );
        registry.register(
            "burstrx_bytes",
            "IPv4 total length of decoded packets",
            bytes_total.clone(),
        );
        registry.register(
            "burstrx_invalid_packets",
            "Packets skipped for an unusable header address",
            invalid_packets_total.clone(),
        );
        registry.register(
            "burstrx_malformed_batches",
            "Batches dropped for an inconsistent header",
            malformed_batches_total.clone(),
        );
        registry.register(
            "burstrx_firewall_dropped",
            "Packets dropped by the destination blacklist",
            dropped_total.clone(),
        );

        Self {
            registry,
            packets_total,
            bytes_total,
            invalid_packets_total,
            malformed_batches_total,
            dropped_total,
        }
    }
}

/// Bring a monotonic counter up to `target`.
fn catch_up(counter: &Counter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}

// ── Response Types ────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    total_packets: u64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    uptime_seconds: u64,
    #[serde(flatten)]
    poller: StatsSnapshot,
    forwarded: u64,
    dropped: u64,
    untracked_drops: u64,
    packets_per_second: f64,
}

#[derive(Serialize)]
pub struct DropEntry {
    destination: String,
    packets: u64,
}

#[derive(Deserialize)]
pub struct DropParams {
    limit: Option<usize>,
}

// ── Router ────────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>, allowed_ips: &[String]) -> Router {
    let metrics = Arc::new(Metrics::new());

    let mut app = Router::new()
        .route("/api/health", get(get_health))
        .route("/api/stats", get(get_stats))
        .route("/api/drops", get(get_drops))
        .route("/metrics", get({
            let m = metrics.clone();
            let s = state.clone();
            move || get_metrics(s.clone(), m.clone())
        }));

    // Apply IP allowlist middleware if configured.
    if !allowed_ips.is_empty() {
        let nets: Arc<Vec<IpNet>> = Arc::new(
            allowed_ips
                .iter()
                .filter_map(|s| s.parse::<IpNet>().ok())
                .collect(),
        );
        app = app.layer(middleware::from_fn(move |req, next| {
            let nets = nets.clone();
            ip_allowlist(req, next, nets)
        }));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

// ── IP Allowlist Middleware ────────────────────────────────────────────────────

async fn ip_allowlist(
    req: axum::extract::Request,
    next: middleware::Next,
    allowed: Arc<Vec<IpNet>>,
) -> impl IntoResponse {
    if let Some(connect_info) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        let ip = connect_info.0.ip();
        if allowed.iter().any(|net| net.contains(&ip)) {
            return next.run(req).await.into_response();
        }
        return StatusCode::FORBIDDEN.into_response();
    }
    // If there is no ConnectInfo, allow (should not happen with into_make_service_with_connect_info).
    next.run(req).await.into_response()
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        total_packets: state.poller.total_packets.load(Ordering::Relaxed),
    })
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let uptime = state.start_time.elapsed().as_secs();
    let poller = state.poller.snapshot();

    let packets_per_second = if uptime > 0 {
        poller.total_packets as f64 / uptime as f64
    } else {
        0.0
    };

    Json(StatsResponse {
        uptime_seconds: uptime,
        poller,
        forwarded: state.firewall.forwarded.load(Ordering::Relaxed),
        dropped: state.firewall.dropped.load(Ordering::Relaxed),
        untracked_drops: state.firewall.untracked_drops.load(Ordering::Relaxed),
        packets_per_second,
    })
}

async fn get_drops(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DropParams>,
) -> Json<Vec<DropEntry>> {
    let limit = params.limit.unwrap_or(50).min(1000);
    let mut drops: Vec<DropEntry> = state
        .firewall
        .drops_by_destination
        .iter()
        .map(|entry| DropEntry {
            destination: entry.key().to_string(),
            packets: entry.value().packets,
        })
        .collect();

    drops.sort_by(|a, b| b.packets.cmp(&a.packets));
    drops.truncate(limit);
    Json(drops)
}

async fn get_metrics(state: Arc<AppState>, metrics: Arc<Metrics>) -> impl IntoResponse {
    // prometheus-client Counters are monotonic so we increment by the delta.
    let snap = state.poller.snapshot();
    catch_up(&metrics.packets_total, snap.total_packets);
    catch_up(&metrics.bytes_total, snap.total_bytes);
    catch_up(&metrics.invalid_packets_total, snap.invalid_packets);
    catch_up(&metrics.malformed_batches_total, snap.malformed_batches);
    catch_up(
        &metrics.dropped_total,
        state.firewall.dropped.load(Ordering::Relaxed),
    );

    let mut buf = String::new();
    if let Err(e) = encode(&mut buf, &metrics.registry) {
        tracing::error!("Failed to encode metrics: {}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        buf,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::net::Ipv4Addr;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let poller = Arc::new(PollerStats::new());
        poller.total_packets.fetch_add(42, Ordering::Relaxed);
        poller.total_bytes.fetch_add(4200, Ordering::Relaxed);
        let firewall = Arc::new(FirewallStats::default());
        firewall.record_drop(Ipv4Addr::new(0, 0, 0, 1));
        firewall.record_drop(Ipv4Addr::new(0, 0, 0, 1));
        firewall.record_drop(Ipv4Addr::new(0, 0, 0, 0));
        Arc::new(AppState {
            poller,
            firewall,
            start_time: Instant::now(),
        })
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_total() {
        let app = router(state(), &[]);
        let resp = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["total_packets"], 42);
    }

    #[tokio::test]
    async fn test_stats_flattens_poller_counters() {
        let app = router(state(), &[]);
        let resp = app
            .oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["total_bytes"], 4200);
        assert_eq!(json["dropped"], 3);
        assert_eq!(json["invalid_packets"], 0);
    }

    #[tokio::test]
    async fn test_drops_sorted_and_limited() {
        let app = router(state(), &[]);
        let resp = app
            .oneshot(Request::get("/api/drops?limit=1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["destination"], "0.0.0.1");
        assert_eq!(json[0]["packets"], 2);
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let app = router(state(), &[]);
        let resp = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("burstrx_packets_total 42"));
        assert!(text.contains("burstrx_firewall_dropped_total 3"));
    }

    #[tokio::test]
    async fn test_allowlist_rejects_other_clients() {
        let app = router(state(), &["10.0.0.0/8".to_string()]);
        let mut req = Request::get("/api/health").body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo("192.0.2.5:40000".parse::<SocketAddr>().unwrap()));
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
