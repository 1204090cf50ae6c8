use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::aggregate::CandidateError;
use super::approval::{ApprovalError, ApprovalRequest};
use super::domain::{CandidateId, PublicationFacts};
use super::organization::OrganizationProvider;
use super::points::PointCalculationError;
use super::repository::{CandidateRepository, CandidateUpdatePublisher, RepositoryError};
use super::service::{CandidateService, CandidateServiceError};

/// Router builder exposing HTTP endpoints for evaluation and approval.
pub fn candidate_router<R, P, O>(service: Arc<CandidateService<R, P, O>>) -> Router
where
    R: CandidateRepository + 'static,
    P: CandidateUpdatePublisher + 'static,
    O: OrganizationProvider + 'static,
{
    Router::new()
        .route(
            "/api/v1/candidates/evaluations",
            post(evaluate_handler::<R, P, O>),
        )
        .route(
            "/api/v1/candidates/:candidate_id",
            get(candidate_handler::<R, P, O>),
        )
        .route(
            "/api/v1/candidates/:candidate_id/approvals",
            post(approval_handler::<R, P, O>),
        )
        .with_state(service)
}

/// HTTP status for a service error: caller errors map to 4xx, defects to 5xx.
pub fn status_for(error: &CandidateServiceError) -> StatusCode {
    match error {
        CandidateServiceError::NotApplicable(_)
        | CandidateServiceError::Calculation(PointCalculationError::InvalidPublicationFacts(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CandidateServiceError::Candidate(CandidateError::Approval(ApprovalError::NotFound(_)))
        | CandidateServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        CandidateServiceError::Candidate(CandidateError::Approval(
            ApprovalError::InvalidState { .. },
        ))
        | CandidateServiceError::Candidate(CandidateError::NotApplicable(_))
        | CandidateServiceError::RetriesExhausted { .. } => StatusCode::CONFLICT,
        CandidateServiceError::Repository(RepositoryError::ConcurrentModification { .. }) => {
            StatusCode::PRECONDITION_FAILED
        }
        CandidateServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CandidateServiceError::Calculation(PointCalculationError::CalculationInvariantViolation(
            _,
        ))
        | CandidateServiceError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: CandidateServiceError) -> Response {
    let status = status_for(&error);
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn evaluate_handler<R, P, O>(
    State(service): State<Arc<CandidateService<R, P, O>>>,
    axum::Json(facts): axum::Json<PublicationFacts>,
) -> Response
where
    R: CandidateRepository + 'static,
    P: CandidateUpdatePublisher + 'static,
    O: OrganizationProvider + 'static,
{
    match service.evaluate(facts) {
        Ok(report) => {
            let payload = json!({
                "candidate": report.candidate.view(),
                "changed": report.changed,
                "excluded_affiliations": report.excluded_affiliations,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn candidate_handler<R, P, O>(
    State(service): State<Arc<CandidateService<R, P, O>>>,
    Path(candidate_id): Path<String>,
) -> Response
where
    R: CandidateRepository + 'static,
    P: CandidateUpdatePublisher + 'static,
    O: OrganizationProvider + 'static,
{
    match service.get(&CandidateId(candidate_id)) {
        Ok(candidate) => (StatusCode::OK, axum::Json(candidate.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn approval_handler<R, P, O>(
    State(service): State<Arc<CandidateService<R, P, O>>>,
    Path(candidate_id): Path<String>,
    axum::Json(request): axum::Json<ApprovalRequest>,
) -> Response
where
    R: CandidateRepository + 'static,
    P: CandidateUpdatePublisher + 'static,
    O: OrganizationProvider + 'static,
{
    match service.update_approval(&CandidateId(candidate_id), request) {
        Ok(candidate) => (StatusCode::OK, axum::Json(candidate.view())).into_response(),
        Err(error) => error_response(error),
    }
}
