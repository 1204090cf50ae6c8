use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use nvi_engine::workflows::candidates::{
    candidate_router, CandidateRepository, CandidateService, CandidateUpdatePublisher,
    OrganizationProvider,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_candidate_routes<R, P, O>(
    service: Arc<CandidateService<R, P, O>>,
) -> axum::Router
where
    R: CandidateRepository + 'static,
    P: CandidateUpdatePublisher + 'static,
    O: OrganizationProvider + 'static,
{
    candidate_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let (status, label) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "initializing")
    };

    (status, Json(json!({ "status": label })))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{
        InMemoryCandidateRepository, InMemoryOrganizationRegistry, TracingUpdatePublisher,
    };
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use nvi_engine::config::CandidateConfig;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let service = Arc::new(CandidateService::new(
            Arc::new(InMemoryCandidateRepository::default()),
            Arc::new(TracingUpdatePublisher),
            Arc::new(InMemoryOrganizationRegistry::sample()),
            &CandidateConfig::default(),
        ));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_candidate_routes(service).layer(Extension(state))
    }

    async fn get(router: axum::Router, uri: &str) -> StatusCode {
        router
            .oneshot(Request::get(uri).body(Body::empty()).expect("request builds"))
            .await
            .expect("router responds")
            .status()
    }

    #[tokio::test]
    async fn health_is_always_ok() {
        assert_eq!(get(app(false), "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_reflects_startup_flag() {
        assert_eq!(
            get(app(false), "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(get(app(true), "/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn candidate_routes_are_mounted() {
        assert_eq!(
            get(app(true), "/api/v1/candidates/unknown").await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(get(app(true), "/metrics").await, StatusCode::OK);
    }
}
