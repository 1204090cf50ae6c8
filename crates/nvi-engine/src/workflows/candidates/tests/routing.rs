use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::candidates::domain::ScientificValue;
use crate::workflows::candidates::router::{approval_handler, status_for};
use crate::workflows::candidates::{candidate_router, CandidateService, CandidateServiceError};

fn json_request(method: &str, uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&payload).expect("serialize payload")))
        .expect("request builds")
}

#[tokio::test]
async fn evaluation_route_returns_candidate_view() {
    let (service, _, _) = build_service();
    let router = candidate_router(Arc::new(service));

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/candidates/evaluations",
            serde_json::to_value(two_institution_article()).expect("facts serialize"),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["changed"], json!(true));
    assert_eq!(body["candidate"]["version"], json!(1));
    assert_eq!(body["candidate"]["global_status"], json!("pending"));
    assert_eq!(body["candidate"]["total_points"], json!("1.3000"));
    assert_eq!(body["candidate"]["is_international_collaboration"], json!(true));
    assert_eq!(
        body["candidate"]["institutions"]
            .as_array()
            .expect("institutions array")
            .len(),
        2
    );
}

#[tokio::test]
async fn evaluation_route_rejects_unscorable_publications() {
    let (service, _, _) = build_service();
    let router = candidate_router(Arc::new(service));
    let mut facts = single_creator_article();
    facts.channel.scientific_value = ScientificValue::LevelZero;

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/candidates/evaluations",
            serde_json::to_value(facts).expect("facts serialize"),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("not rated"));
}

#[tokio::test]
async fn candidate_route_returns_not_found_for_unknown_id() {
    let (service, _, _) = build_service();
    let router = candidate_router(Arc::new(service));

    let response = router
        .oneshot(
            Request::get("/api/v1/candidates/pub-missing")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn approval_route_applies_decisions() {
    let (service, _, _) = build_service();
    service
        .evaluate(single_creator_article())
        .expect("evaluation succeeds");
    let router = candidate_router(Arc::new(service));

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/candidates/pub-a/approvals",
            json!({
                "institution_id": "uio",
                "action": { "type": "decide", "decision": "approved" },
                "actor": "curator",
                "expected_version": 1
            }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["version"], json!(2));
    assert_eq!(body["global_status"], json!("approved"));
    assert_eq!(body["institutions"][0]["finalized_by"], json!("curator"));

    let response = router
        .oneshot(
            Request::get("/api/v1/candidates/pub-a")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["institutions"][0]["status"], json!("approved"));
}

#[tokio::test]
async fn approval_route_maps_state_and_version_conflicts() {
    let (service, _, _) = build_service();
    service
        .evaluate(single_creator_article())
        .expect("evaluation succeeds");
    let service = Arc::new(service);

    let invalid = approval_handler(
        State(service.clone()),
        Path("pub-a".to_string()),
        axum::Json(reopen("uio", "curator")),
    )
    .await;
    assert_eq!(invalid.status(), StatusCode::CONFLICT);

    let mut stale = assign("uio", "curator");
    stale.expected_version = Some(7);
    let stale = approval_handler(
        State(service.clone()),
        Path("pub-a".to_string()),
        axum::Json(stale),
    )
    .await;
    assert_eq!(stale.status(), StatusCode::PRECONDITION_FAILED);

    let unknown = approval_handler(
        State(service),
        Path("pub-a".to_string()),
        axum::Json(assign("ntnu", "curator")),
    )
    .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn evaluation_route_reports_exhausted_retries_as_conflict() {
    let repository = Arc::new(MemoryRepository::default());
    repository.inject_conflicts(u32::MAX);
    let service = CandidateService::new(
        repository,
        Arc::new(MemoryPublisher::default()),
        Arc::new(MapOrganizations::new(organizations())),
        &candidate_config(2),
    );
    let router = candidate_router(Arc::new(service));

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/candidates/evaluations",
            serde_json::to_value(single_creator_article()).expect("facts serialize"),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[test]
fn repository_outage_maps_to_service_unavailable() {
    let error = CandidateServiceError::Repository(
        crate::workflows::candidates::RepositoryError::Unavailable("down".to_string()),
    );
    assert_eq!(status_for(&error), StatusCode::SERVICE_UNAVAILABLE);
}
