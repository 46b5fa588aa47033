//! Logging, trace propagation and metrics for the Vigil backend.
//!
//! `init_observability` runs once per process: it installs the fmt subscriber,
//! attaches an OTLP span exporter when `OTEL_EXPORTER_OTLP_ENDPOINT` is set,
//! and installs the Prometheus recorder with the `vigil_*` counter
//! descriptions. Later calls return the same metrics handle.
use axum::Router;
use axum::http::HeaderMap;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::KeyValue;
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

static METRICS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Counters emitted by the trust layer, with their help text.
const COUNTERS: &[(&str, &str)] = &[
    (
        "vigil_pair_codes_issued_total",
        "Pair codes issued to tenant actors",
    ),
    (
        "vigil_pair_codes_redeemed_total",
        "Pair code redemption attempts by outcome",
    ),
    (
        "vigil_agent_tokens_issued_total",
        "Agent access tokens minted from refresh secrets",
    ),
    (
        "vigil_user_sessions_total",
        "Human sessions opened by register or login",
    ),
    (
        "vigil_camera_credentials_sealed_total",
        "Camera RTSP credentials sealed for a relay agent",
    ),
];

pub fn init_observability(service_name: &str) -> PrometheusHandle {
    METRICS
        .get_or_init(|| {
            init_tracing(service_name);
            let handle = install_recorder();
            for (name, help) in COUNTERS {
                metrics::describe_counter!(*name, *help);
            }
            handle
        })
        .clone()
}

fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    let result = match otlp_tracer_provider(service_name) {
        Some(provider) => {
            let tracer = provider.tracer(service_name.to_string());
            registry
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
        }
        None => registry.try_init(),
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

fn otlp_tracer_provider(service_name: &str) -> Option<SdkTracerProvider> {
    std::env::var_os(OTLP_ENDPOINT_ENV)?;
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .ok()?;
    let resource = Resource::builder_empty()
        .with_attributes([KeyValue::new("service.name", service_name.to_string())])
        .build();
    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build(),
    )
}

fn install_recorder() -> PrometheusHandle {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(err) => {
            tracing::warn!(error = %err, "metrics recorder already installed; using a detached one");
            PrometheusBuilder::new().build_recorder().handle()
        }
    }
}

/// Remote parent carried in W3C `traceparent`/`tracestate` headers, if any.
pub fn trace_context_from_headers(headers: &HeaderMap) -> opentelemetry::Context {
    TraceContextPropagator::new().extract(&TraceHeaders(headers))
}

struct TraceHeaders<'a>(&'a HeaderMap);

impl Extractor for TraceHeaders<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.to_str().ok()
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    )
}

pub async fn serve_metrics(handle: PrometheusHandle, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics listening");
    axum::serve(listener, metrics_router(handle)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::pairing::issue_pair_code;
    use crate::store::memory::InMemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use opentelemetry::trace::{TraceContextExt, TraceId};
    use serial_test::serial;
    use tower::ServiceExt;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn traceparent_becomes_remote_parent() {
        let mut headers = HeaderMap::new();
        headers.insert("traceparent", TRACEPARENT.parse().expect("header"));
        let context = trace_context_from_headers(&headers);
        let span = context.span();
        let parent = span.span_context();
        assert!(parent.is_remote());
        assert_eq!(
            parent.trace_id(),
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").expect("trace id")
        );
    }

    #[test]
    fn missing_or_unreadable_traceparent_has_no_parent() {
        let empty = trace_context_from_headers(&HeaderMap::new());
        assert!(!empty.span().span_context().is_valid());

        let mut headers = HeaderMap::new();
        headers.insert(
            "traceparent",
            axum::http::HeaderValue::from_bytes(b"\xFF").expect("header"),
        );
        let garbled = trace_context_from_headers(&headers);
        assert!(!garbled.span().span_context().is_valid());
    }

    #[test]
    fn no_exporter_without_endpoint() {
        if std::env::var_os(OTLP_ENDPOINT_ENV).is_some() {
            return;
        }
        assert!(otlp_tracer_provider("vigil-backend").is_none());
    }

    #[tokio::test]
    #[serial]
    async fn pair_code_issue_shows_on_metrics_endpoint() {
        let handle = init_observability("vigil-backend-test");

        let store = InMemoryStore::new();
        issue_pair_code(&store, "T1", "Gate-01", chrono::Duration::minutes(10))
            .await
            .expect("pair code");

        let response = metrics_router(handle)
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("metrics");
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let text = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(text.contains("# HELP vigil_pair_codes_issued_total Pair codes issued"));
        assert!(text.contains("# TYPE vigil_pair_codes_issued_total counter"));
        assert!(
            text.lines()
                .any(|line| line.starts_with("vigil_pair_codes_issued_total "))
        );
    }
}
