mod support;

use axum::http::Method;
use serde_json::json;

use support::{MockService, Reply};
use vigil_sdk::{ApiError, StreamClient};

#[test_timeout::tokio_timeout_test(20)]
async fn start_stream_reports_room_and_producer() {
    let service = MockService::spawn(|request| match request.path.as_str() {
        "/api/cameras/12/start-stream" => Reply::json(json!({
            "success": true,
            "message": "Camera stream started successfully",
            "device_id": "12",
            "room_id": "cam-12",
            "producers": { "video": "prod-video-12" },
            "websocket_url": "ws://media.test:8080/ws/mediasoup"
        })),
        "/api/cameras/12/stream-status" => Reply::json(json!({
            "success": true,
            "camera_id": 12,
            "vas_device_id": "dev-12",
            "status": "live"
        })),
        _ => Reply::json(json!({ "success": true, "message": "Camera stream stopped successfully" })),
    })
    .await;
    let client = StreamClient::new(&service.base_url, Some("tok".into())).unwrap();

    let started = client.start_stream("12").await.unwrap();
    let target = started.target().unwrap();
    assert_eq!(target.room_id, "cam-12");
    assert_eq!(target.producer_id, "prod-video-12");
    assert_eq!(
        target.signaling_url.as_deref(),
        Some("ws://media.test:8080/ws/mediasoup")
    );

    let status = client.stream_status("12").await.unwrap();
    assert_eq!(status.status.as_deref(), Some("live"));
    assert_eq!(status.extra.get("vas_device_id"), Some(&json!("dev-12")));

    let stopped = client.stop_stream("12").await.unwrap();
    assert_eq!(stopped.as_deref(), Some("Camera stream stopped successfully"));

    let requests = service.requests();
    let calls: Vec<_> = requests
        .iter()
        .map(|r| (r.method.clone(), r.path.as_str()))
        .collect();
    assert_eq!(
        calls,
        vec![
            (Method::POST, "/api/cameras/12/start-stream"),
            (Method::GET, "/api/cameras/12/stream-status"),
            (Method::POST, "/api/cameras/12/stop-stream"),
        ]
    );
    assert!(requests
        .iter()
        .all(|r| r.authorization.as_deref() == Some("Bearer tok")));
}

#[test_timeout::tokio_timeout_test(20)]
async fn media_server_failure_is_an_unexpected_status() {
    let service = MockService::spawn(|_| {
        Reply::status(
            500,
            json!({
                "error": "Internal Server Error",
                "message": "Failed to start camera stream",
                "error_details": "device offline"
            }),
        )
    })
    .await;
    let client = StreamClient::new(&service.base_url, None).unwrap();

    let err = client.start_stream("4").await.unwrap_err();
    assert!(matches!(err, ApiError::UnexpectedStatus { .. }));
    assert_eq!(
        err.server_message().as_deref(),
        Some("Failed to start camera stream")
    );
    assert_eq!(service.requests()[0].authorization, None);
}
