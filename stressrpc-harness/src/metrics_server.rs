use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use stressrpc_common::{ErrorResponse, GaugeResponse, StatusCode as RpcStatus};

use crate::error::{Result, StressError};
use crate::histogram::{Histogram, HistogramSnapshot};

/// The only gauge the endpoint publishes: calls per second since the previous poll.
pub const QPS_GAUGE_NAME: &str = "rust_overall_qps";

/// State shared by the metrics handlers.
#[derive(Clone)]
pub struct MetricsState {
    pub histogram: Arc<Histogram>,
    last_poll: Arc<Mutex<Instant>>,
}

impl MetricsState {
    pub fn new(histogram: Arc<Histogram>) -> Self {
        Self { histogram, last_poll: Arc::new(Mutex::new(Instant::now())) }
    }

    /// Snapshot-and-reset the histogram and return it with the seconds since the last poll.
    /// The two locks are taken one after the other, never nested.
    fn poll(&self) -> (HistogramSnapshot, f64) {
        let snapshot = self.histogram.snapshot_and_reset();
        let now = Instant::now();
        let previous = {
            let mut last = self.last_poll.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *last, now)
        };
        (snapshot, now.saturating_duration_since(previous).as_secs_f64())
    }

    fn qps_gauge(&self) -> GaugeResponse {
        let (snapshot, elapsed) = self.poll();
        let qps = if elapsed > 0.0 { (snapshot.count as f64 / elapsed) as i64 } else { 0 };
        GaugeResponse { name: QPS_GAUGE_NAME.to_string(), long_value: qps }
    }
}

/// HTTP endpoint exposing the shared latency histogram for external polling.
///
/// Every poll resets the histogram, so each response covers the interval since the previous
/// poll. Handlers never touch runner state.
pub struct MetricsServer {
    listener: tokio::net::TcpListener,
    state: MetricsState,
}

impl MetricsServer {
    /// Bind the endpoint on all interfaces; port 0 picks an ephemeral port.
    pub async fn bind(port: u16, histogram: Arc<Histogram>) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| StressError::MetricsServer(format!("cannot bind {addr}: {e}")))?;
        Ok(Self { listener, state: MetricsState::new(histogram) })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| StressError::MetricsServer(e.to_string()))
    }

    pub fn create_router(state: MetricsState) -> Router {
        Router::new()
            .route("/histogram", get(handle_histogram))
            .route("/gauges", get(handle_all_gauges))
            .route("/gauges/:name", get(handle_gauge))
            .with_state(state)
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let app = Self::create_router(self.state);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| StressError::MetricsServer(e.to_string()))
    }
}

/// Handler for GET /histogram: the histogram since the last poll, then reset.
pub async fn handle_histogram(State(state): State<MetricsState>) -> Json<HistogramSnapshot> {
    let (snapshot, _) = state.poll();
    Json(snapshot)
}

/// Handler for GET /gauges: every gauge.
pub async fn handle_all_gauges(State(state): State<MetricsState>) -> Json<Vec<GaugeResponse>> {
    Json(vec![state.qps_gauge()])
}

/// Handler for GET /gauges/:name: one gauge, 404 if unknown.
pub async fn handle_gauge(State(state): State<MetricsState>, Path(name): Path<String>) -> Response {
    if name != QPS_GAUGE_NAME {
        let body = ErrorResponse { code: RpcStatus::NotFound, message: format!("Gauge {name} does not exist") };
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    }
    Json(state.qps_gauge()).into_response()
}
