use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryCandidateRepository, InMemoryOrganizationRegistry, TracingUpdatePublisher,
};
use crate::routes::with_candidate_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use nvi_engine::config::{AppConfig, CandidateConfig};
use nvi_engine::error::AppError;
use nvi_engine::telemetry;
use nvi_engine::workflows::candidates::CandidateService;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let registry = load_registry(&config.candidates)?;
    info!(organizations = registry.len(), "organization registry loaded");

    let candidate_service = Arc::new(CandidateService::new(
        Arc::new(InMemoryCandidateRepository::default()),
        Arc::new(TracingUpdatePublisher),
        Arc::new(registry),
        &config.candidates,
    ));

    let app = with_candidate_routes(candidate_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        max_recalculation_attempts = config.candidates.max_recalculation_attempts,
        "nvi candidate service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn load_registry(
    config: &CandidateConfig,
) -> Result<InMemoryOrganizationRegistry, AppError> {
    match &config.organizations_path {
        Some(path) => InMemoryOrganizationRegistry::from_json_file(path),
        None => Ok(InMemoryOrganizationRegistry::sample()),
    }
}
