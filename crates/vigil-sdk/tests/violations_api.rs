mod support;

use axum::http::Method;
use vigil_sdk::error::StatusCode;
use serde_json::json;

use support::{MockService, Reply, violation_json};
use vigil_sdk::{
    ApiError, BulkUpdate, DetectionModel, NewViolation, ProcessingRequest, ProcessingStatus,
    Severity, SortField, ViolationClient, ViolationFilter, ViolationStatus, ViolationType,
    ViolationUpdate,
};

fn client(service: &MockService) -> ViolationClient {
    ViolationClient::new(&service.base_url, Some("token-abc".into())).unwrap()
}

#[test_timeout::tokio_timeout_test(20)]
async fn list_sends_filters_and_bearer_token() {
    let service = MockService::spawn(|_| {
        Reply::json(json!({
            "success": true,
            "count": 2,
            "total": 17,
            "violations": [violation_json(4, "new"), violation_json(5, "reviewed")]
        }))
    })
    .await;

    let page = client(&service)
        .list(&ViolationFilter {
            severity: Some(Severity::High),
            camera_id: Some(3),
            limit: Some(2),
            sort_by: Some(SortField::AiConfidence),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(page.count, 2);
    assert_eq!(page.total, 17);
    assert_eq!(page.violations[1].status, ViolationStatus::Reviewed);
    assert_eq!(page.violations[0].ai_confidence, 91.2);

    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[0].path, "/api/violations");
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer token-abc"));
    let mut query = requests[0].query_pairs();
    query.sort();
    assert_eq!(
        query,
        vec![
            ("camera_id".to_string(), "3".to_string()),
            ("limit".to_string(), "2".to_string()),
            ("severity".to_string(), "high".to_string()),
            ("sort_by".to_string(), "ai_confidence".to_string()),
        ]
    );
}

#[test_timeout::tokio_timeout_test(20)]
async fn missing_violation_surfaces_status_and_message() {
    let service = MockService::spawn(|_| {
        Reply::status(
            404,
            json!({ "error": "Not Found", "message": "Violation report not found" }),
        )
    })
    .await;

    let err = client(&service).get(999).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(
        err.server_message().as_deref(),
        Some("Violation report not found")
    );
}

#[test_timeout::tokio_timeout_test(20)]
async fn invalid_requests_never_reach_the_service() {
    let service = MockService::spawn(|_| Reply::json(json!({ "success": true }))).await;
    let client = client(&service);

    let mut new = NewViolation::new(ViolationType::FallRisk, Severity::Low, 120.0, 1);
    assert!(matches!(
        client.create(&new).await,
        Err(ApiError::Validation(_))
    ));
    new.ai_confidence = 80.0;
    new.camera_id = 0;
    assert!(matches!(
        client.create(&new).await,
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        client.acknowledge(4, Some(&"n".repeat(2001))).await,
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        client
            .list(&ViolationFilter {
                limit: Some(5000),
                ..Default::default()
            })
            .await,
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        client
            .start_processing(&ProcessingRequest::new(2).with_interval_ms(500))
            .await,
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(client.get(0).await, Err(ApiError::Validation(_))));

    assert!(service.requests().is_empty());
}

#[test_timeout::tokio_timeout_test(20)]
async fn create_and_update_round_trip_through_envelopes() {
    let service = MockService::spawn(|request| {
        let status = if request.method == Method::POST {
            "new"
        } else {
            "investigating"
        };
        Reply::status(
            if request.method == Method::POST { 201 } else { 200 },
            json!({
                "success": true,
                "message": "ok",
                "violation": violation_json(21, status)
            }),
        )
    })
    .await;
    let client = client(&service);

    let mut new = NewViolation::new(ViolationType::PpeMissing, Severity::High, 91.2, 3);
    new.description = Some("Worker without helmet near crane".into());
    new.bounding_boxes = Some(json!([{ "x": 1, "y": 2, "width": 3, "height": 4 }]));
    let created = client.create(&new).await.unwrap();
    assert_eq!(created.id, 21);
    assert_eq!(created.status, ViolationStatus::New);

    let updated = client
        .update(
            21,
            &ViolationUpdate {
                status: Some(ViolationStatus::Investigating),
                investigator_id: Some(8),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status, ViolationStatus::Investigating);

    let requests = service.requests();
    assert_eq!(requests[0].path, "/api/violations");
    assert_eq!(requests[0].body["violation_type"], "ppe_missing");
    assert_eq!(requests[0].body["camera_id"], 3);
    assert!(requests[0].body.get("thumbnail_url").is_none());
    assert_eq!(requests[1].method, Method::PUT);
    assert_eq!(requests[1].path, "/api/violations/21");
    assert_eq!(
        requests[1].body,
        json!({ "status": "investigating", "investigator_id": 8 })
    );
}

#[test_timeout::tokio_timeout_test(20)]
async fn workflow_transitions_post_notes_to_their_endpoints() {
    let service = MockService::spawn(|request| {
        let status = match request.path.rsplit('/').next() {
            Some("acknowledge") => "reviewed",
            Some("resolve") => "resolved",
            _ => "false_positive",
        };
        Reply::json(json!({ "success": true, "violation": violation_json(7, status) }))
    })
    .await;
    let client = client(&service);

    let acked = client.acknowledge(7, Some("on it")).await.unwrap();
    let resolved = client.resolve(7, None).await.unwrap();
    let dismissed = client.mark_false_positive(7, Some("shadow")).await.unwrap();
    assert_eq!(acked.status, ViolationStatus::Reviewed);
    assert_eq!(resolved.status, ViolationStatus::Resolved);
    assert_eq!(dismissed.status, ViolationStatus::FalsePositive);

    let requests = service.requests();
    let paths: Vec<_> = requests.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "/api/violations/7/acknowledge",
            "/api/violations/7/resolve",
            "/api/violations/7/false-positive",
        ]
    );
    assert_eq!(requests[0].body, json!({ "notes": "on it" }));
    assert_eq!(requests[1].body, json!({}));
}

#[test_timeout::tokio_timeout_test(20)]
async fn bulk_update_delete_and_stats() {
    let service = MockService::spawn(|request| match request.path.as_str() {
        "/api/violations/bulk-update" => Reply::json(json!({
            "success": true,
            "message": "3 violations updated successfully",
            "updated_count": 3
        })),
        "/api/violations/stats" => Reply::json(json!({
            "success": true,
            "stats": {
                "total": 40,
                "today": 2,
                "this_week": 11,
                "by_type": { "ppe_missing": 25, "work_at_height": 15 },
                "by_severity": { "high": 10, "low": 30 },
                "by_status": { "new": 12 }
            }
        })),
        _ => Reply::json(json!({ "success": true, "message": "Violation deleted successfully" })),
    })
    .await;
    let client = client(&service);

    let outcome = client
        .bulk_update(&BulkUpdate {
            violation_ids: vec![1, 2, 3],
            status: ViolationStatus::Resolved,
            investigator_id: Some(4),
            notes: None,
        })
        .await
        .unwrap();
    assert_eq!(outcome.updated_count, 3);

    let deleted = client.delete(9).await.unwrap();
    assert_eq!(deleted.as_deref(), Some("Violation deleted successfully"));

    let stats = client.stats().await.unwrap();
    assert_eq!(stats.total, 40);
    assert_eq!(stats.this_week, 11);
    assert_eq!(stats.by_type.get("work_at_height"), Some(&15));
    assert_eq!(stats.by_status.get("new"), Some(&12));

    let requests = service.requests();
    assert_eq!(
        requests[0].body,
        json!({ "violation_ids": [1, 2, 3], "status": "resolved", "investigator_id": 4 })
    );
    assert_eq!(requests[1].method, Method::DELETE);
    assert_eq!(requests[1].path, "/api/violations/9");
}

#[test_timeout::tokio_timeout_test(20)]
async fn export_returns_the_csv_body() {
    let csv = "id,timestamp,violation_type,severity\n4,2025-03-01T08:15:00.000Z,ppe_missing,high\n";
    let service = MockService::spawn(move |_| Reply::text("text/csv", csv)).await;

    let exported = client(&service)
        .export_csv(&ViolationFilter {
            violation_type: Some(ViolationType::PpeMissing),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(exported, csv);

    let requests = service.requests();
    assert_eq!(requests[0].path, "/api/violations/export");
    assert_eq!(requests[0].query.as_deref(), Some("violation_type=ppe_missing"));
}

#[test_timeout::tokio_timeout_test(20)]
async fn processing_control_and_both_status_shapes() {
    let service = MockService::spawn(|request| match request.path.as_str() {
        "/api/violations/processing/start" => Reply::json(json!({
            "success": true,
            "message": "Violation processing started successfully",
            "processing_id": "camera_5_1700000000000",
            "camera_id": 5,
            "status": "started"
        })),
        "/api/violations/processing/stop" => Reply::json(json!({
            "success": true,
            "message": "Violation processing stopped successfully",
            "status": "stopped"
        })),
        _ if request.query.is_some() => Reply::json(json!({
            "success": true,
            "camera_id": "5",
            "is_processing": true,
            "model_type": "fall_detection",
            "violations_detected": 3,
            "processing_errors": 0
        })),
        _ => Reply::json(json!({
            "success": true,
            "ai_models_service": true,
            "available_models": 2,
            "models_list": [{ "name": "work_at_height" }, { "name": "fall_detection" }],
            "camera_service": true
        })),
    })
    .await;
    let client = client(&service);

    let started = client
        .start_processing(
            &ProcessingRequest::new(5)
                .with_model(DetectionModel::FallDetection)
                .with_interval_ms(2000),
        )
        .await
        .unwrap();
    assert_eq!(started.processing_id(), Some("camera_5_1700000000000"));

    let stopped = client
        .stop_processing(5, started.processing_id())
        .await
        .unwrap();
    assert_eq!(stopped.details.get("status"), Some(&json!("stopped")));

    match client.processing_status(Some(5)).await.unwrap() {
        ProcessingStatus::Camera(camera) => {
            assert!(camera.is_processing);
            assert_eq!(camera.violations_detected, 3);
        }
        other => panic!("expected camera status, got {other:?}"),
    }
    match client.processing_status(None).await.unwrap() {
        ProcessingStatus::Overview(overview) => {
            assert!(overview.ai_models_service);
            assert_eq!(overview.available_models, 2);
        }
        other => panic!("expected overview, got {other:?}"),
    }

    let requests = service.requests();
    assert_eq!(
        requests[0].body,
        json!({ "camera_id": 5, "model_type": "fall_detection", "interval_ms": 2000 })
    );
    assert_eq!(
        requests[1].body,
        json!({ "camera_id": 5, "processing_id": "camera_5_1700000000000" })
    );
    assert_eq!(requests[2].query.as_deref(), Some("camera_id=5"));
}
