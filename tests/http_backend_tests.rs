use chrono::{Local, TimeZone};
use rgeoattend::api::http::HttpBackend;
use rgeoattend::api::{AttendanceBackend, CheckInRequest, CheckOutRequest, StaticToken};
use rgeoattend::errors::AppError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> HttpBackend {
    HttpBackend::new(
        &server.uri(),
        Arc::new(StaticToken(Some("secret-token".into()))),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn check_in_request() -> CheckInRequest {
    CheckInRequest {
        geofence_id: Some(1),
        latitude: Some(1.3),
        longitude: Some(103.8),
        timestamp: Local.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_fetch_geofences_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/locations/geofences"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "geofences": [
                {"id": 1, "name": "Office HQ", "type": "Polygon",
                 "coordinates": [[103.799, 1.299], [103.801, 1.299], [103.801, 1.301]]},
                {"id": 2, "name": "Warehouse", "type": "Circle",
                 "center": [103.85, 1.35], "radiusMeters": 150.0, "isActive": false}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = backend(&server).fetch_geofences().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "Office HQ");
    assert_eq!(records[1].radius, Some(150.0));
    assert!(!records[1].is_active);
}

#[tokio::test]
async fn test_check_in_posts_camel_case_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/attendance/checkin"))
        .and(body_partial_json(json!({"geofenceId": 1, "latitude": 1.3})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "checkInTime": "2025-10-01T09:00:05+00:00",
            "locationName": "Office HQ"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let confirmation = backend(&server).check_in(&check_in_request()).await.unwrap();
    let status = confirmation.status.unwrap();
    assert!(status.is_checked_in);
    assert_eq!(status.location_name.as_deref(), Some("Office HQ"));
    assert!(status.check_in_time.is_some());
}

#[tokio::test]
async fn test_manual_check_out_reads_nested_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/attendance/checkout"))
        .and(body_partial_json(json!({"manual": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "status": {
                "isCheckedIn": false,
                "isCheckedOut": true,
                "isManualCheckout": true,
                "checkOutTime": "2025-10-01T12:00:00+00:00",
                "nextCheckInTime": "2025-10-01T18:00:00+00:00"
            }
        })))
        .mount(&server)
        .await;

    let request = CheckOutRequest {
        manual: true,
        geofence_id: Some(1),
        timestamp: Local.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap(),
    };
    let status = backend(&server).check_out(&request).await.unwrap().status.unwrap();
    assert!(status.is_checked_out && status.is_manual_checkout);
    assert!(status.next_check_in_time.is_some());
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/attendance/checkin"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "already checked in"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/attendance/checkout"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/attendance/status"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "token expired"})))
        .mount(&server)
        .await;

    let api = backend(&server);

    match api.check_in(&check_in_request()).await {
        Err(AppError::ServerConflict(msg)) => assert_eq!(msg, "already checked in"),
        other => panic!("expected conflict, got {other:?}"),
    }

    let request = CheckOutRequest {
        manual: false,
        geofence_id: None,
        timestamp: Local::now(),
    };
    let err = api.check_out(&request).await.unwrap_err();
    assert!(err.is_transient());

    match api.attendance_status().await {
        Err(AppError::Unauthorized(msg)) => assert_eq!(msg, "token expired"),
        other => panic!("expected unauthorized, got {other:?}"),
    }
}

#[tokio::test]
async fn test_success_false_and_garbage_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/attendance/checkin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "cooldown active"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/attendance/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let api = backend(&server);
    assert!(matches!(
        api.check_in(&check_in_request()).await,
        Err(AppError::ServerConflict(_))
    ));
    assert!(matches!(
        api.attendance_status().await,
        Err(AppError::Protocol(_))
    ));
}

#[tokio::test]
async fn test_unreachable_backend_is_a_network_failure() {
    // nothing listens on this port once the server is dropped
    let uri = {
        let server = MockServer::builder().start().await;
        server.uri()
    };
    let api = HttpBackend::new(&uri, Arc::new(StaticToken(None)), Duration::from_secs(2)).unwrap();

    let err = api.fetch_geofences().await.unwrap_err();
    assert!(matches!(err, AppError::NetworkFailure(_)));
}
