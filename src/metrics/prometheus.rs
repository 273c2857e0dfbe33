//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::crd::TenantPhase;

lazy_static::lazy_static! {
    /// Total number of reconciliation passes
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "tenant_operator_reconciliations_total",
        "Total number of reconciliation passes",
        &["kind"]
    ).unwrap();

    /// Total number of failed reconciliation passes by error class
    pub static ref RECONCILIATION_ERRORS: CounterVec = register_counter_vec!(
        "tenant_operator_reconciliation_errors_total",
        "Total number of failed reconciliation passes",
        &["kind", "class"]
    ).unwrap();

    /// Reconciliation duration histogram
    pub static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "tenant_operator_reconcile_duration_seconds",
        "Duration of reconciliation passes in seconds",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    /// Child resource create calls by kind and outcome
    pub static ref CHILD_CREATES: CounterVec = register_counter_vec!(
        "tenant_operator_child_creates_total",
        "Child resource create calls by kind and outcome",
        &["kind", "outcome"]
    ).unwrap();

    /// Tenant status writes by result
    pub static ref STATUS_WRITES: CounterVec = register_counter_vec!(
        "tenant_operator_status_writes_total",
        "Tenant status writes by result",
        &["result"]
    ).unwrap();

    /// Retries scheduled after a transient failure
    pub static ref RETRIES_SCHEDULED: prometheus::Counter = prometheus::register_counter!(
        "tenant_operator_retries_scheduled_total",
        "Retries scheduled after a transient failure"
    ).unwrap();

    /// Tenants known to the controller
    pub static ref MANAGED_TENANTS: prometheus::Gauge = prometheus::register_gauge!(
        "tenant_operator_managed_tenants",
        "Number of tenants tracked by the controller"
    ).unwrap();

    /// Current phase per tenant (1 for the active phase)
    pub static ref TENANT_PHASE: GaugeVec = register_gauge_vec!(
        "tenant_operator_tenant_phase",
        "Current phase of each tenant",
        &["name", "phase"]
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: prometheus::Gauge = prometheus::register_gauge!(
        "tenant_operator_health",
        "Operator health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Mark `phase` as the current phase of a tenant
pub fn record_phase(name: &str, phase: TenantPhase) {
    for candidate in TenantPhase::all() {
        TENANT_PHASE
            .with_label_values(&[name, candidate.as_str()])
            .set(if candidate == phase { 1.0 } else { 0.0 });
    }
}

/// Drop the per-tenant series of a deleted tenant
pub fn forget_tenant(name: &str) {
    for phase in TenantPhase::all() {
        // Absent series are fine, the tenant may never have been reported
        let _ = TENANT_PHASE.remove_label_values(&[name, phase.as_str()]);
    }
}

/// Start the metrics HTTP server
pub async fn serve(port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    // Set initial health
    OPERATOR_HEALTH.set(1.0);

    loop {
        let (stream, _) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = shutdown.cancelled() => {
                OPERATOR_HEALTH.set(0.0);
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    Ok(route(req.uri().path()))
}

fn route(path: &str) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => metrics_response(),
        "/healthz" | "/health" => health_response(),
        "/readyz" | "/ready" => ready_response(),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}

/// Generate metrics response
fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(content_type) = encoder.format_type().parse() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, content_type);
    }
    response
}

/// Health check response
fn health_response() -> Response<Full<Bytes>> {
    if OPERATOR_HEALTH.get() > 0.0 {
        text_response(StatusCode::OK, "ok")
    } else {
        text_response(StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    }
}

/// Readiness check response
fn ready_response() -> Response<Full<Bytes>> {
    text_response(StatusCode::OK, "ok")
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
