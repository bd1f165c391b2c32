//! Audit pipeline integration tests
//!
//! Drives real requests through the full middleware stack and asserts on
//! what reaches the audit trail and the audit log channel.

use serde_json::json;

use crate::common::{test_config, test_config_without_audit, TestApp};

#[tokio::test]
async fn test_audited_response_carries_trace_id() {
    let app = TestApp::new().await;

    // Unauthenticated requests are audited too
    let response = app.get("/api/v1/incidents").await;
    response.assert_unauthorized();

    let trace_id = response.trace_id().expect("response should carry a trace id");
    assert!(!trace_id.is_empty());
}

#[tokio::test]
async fn test_valid_trace_header_is_echoed() {
    let app = TestApp::new().await;

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/v1/incidents")
        .header("X-Trace-ID", "abc-123")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.request(request).await;

    assert_eq!(response.trace_id().as_deref(), Some("abc-123"));

    let row = app.wait_for_audit_row("abc-123").await;
    assert_eq!(row.trace_id, "abc-123");
}

#[tokio::test]
async fn test_invalid_trace_header_is_replaced() {
    let app = TestApp::new().await;

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/v1/incidents")
        .header("X-Trace-ID", "bad header!")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.request(request).await;

    let trace_id = response.trace_id().unwrap();
    assert_ne!(trace_id, "bad header!");

    // Generated ids look like 20250114153045-apihost1-k3jd92ma
    let parts: Vec<&str> = trace_id.split('-').collect();
    assert_eq!(parts.len(), 3, "unexpected trace id shape: {}", trace_id);
    assert_eq!(parts[0].len(), 14);
    assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
    assert!(!parts[1].is_empty() && parts[1].len() <= 8);
    assert_eq!(parts[2].len(), 8);
    assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
}

#[tokio::test]
async fn test_request_ids_are_unique_per_request() {
    let app = TestApp::new().await;

    let first = app.get("/api/v1/incidents").await;
    let second = app.get("/api/v1/incidents").await;

    let row_a = app
        .wait_for_audit_row(&first.trace_id().unwrap())
        .await;
    let row_b = app
        .wait_for_audit_row(&second.trace_id().unwrap())
        .await;

    assert_ne!(row_a.request_id, row_b.request_id);
}

#[tokio::test]
async fn test_sensitive_fields_scrubbed_from_request_body() {
    let app = TestApp::new().await;
    let user = app.seed_user("oncall@example.com", "password123", false).await;
    let token = app.token_for(&user);

    // Extra fields are ignored by the handler but still captured by the
    // audit interceptor, so they must come out scrubbed
    let response = app
        .post_json_with_auth(
            "/api/v1/incidents",
            json!({
                "title": "Checkout errors",
                "severity": "high",
                "password": "hunter2-secret",
                "api_token": "tok_live_1234567890"
            }),
            &token,
        )
        .await;
    response.assert_created();

    let row = app.wait_for_audit_row(&response.trace_id().unwrap()).await;

    assert_eq!(row.method, "POST");
    assert_eq!(row.path, "/api/v1/incidents");
    assert_eq!(row.response_status, Some(201));
    assert_eq!(row.user_id, Some(user.id));
    assert_eq!(row.user_email.as_deref(), Some("oncall@example.com"));
    assert!(row.response_time_ms.is_some());
    assert!(row.response_size_bytes.is_some());

    let body = row.request_body.expect("POST body should be captured");
    assert_eq!(body["title"], "Checkout errors");
    assert_eq!(body["password"], "[REDACTED]");
    assert_eq!(body["api_token"], "[REDACTED]");

    // Successful responses are not captured
    assert!(row.response_data.is_none());
    assert!(row.error_message.is_none());
}

#[tokio::test]
async fn test_login_password_redacted_and_email_masked() {
    let app = TestApp::new().await;
    app.seed_user("audit@example.com", "password123", false).await;

    let response = app
        .post_json(
            "/api/v1/auth/login",
            json!({"email": "audit@example.com", "password": "password123"}),
        )
        .await;
    response.assert_ok();

    let row = app.wait_for_audit_row(&response.trace_id().unwrap()).await;
    let body = row.request_body.expect("login body should be captured");

    assert_eq!(body["password"], "[REDACTED]");
    // Masked fields keep only the first and last two characters
    assert_eq!(body["email"], "au*************om");
}

#[tokio::test]
async fn test_get_requests_never_capture_body() {
    let app = TestApp::new().await;
    let user = app.seed_user("oncall@example.com", "password123", false).await;
    let token = app.token_for(&user);

    let response = app.get_with_auth("/api/v1/incidents", &token).await;
    response.assert_ok();

    let row = app.wait_for_audit_row(&response.trace_id().unwrap()).await;
    assert!(row.request_body.is_none());
}

#[tokio::test]
async fn test_error_responses_are_captured() {
    let app = TestApp::new().await;
    let user = app.seed_user("oncall@example.com", "password123", false).await;
    let token = app.token_for(&user);

    let response = app.get_with_auth("/api/v1/incidents/999999", &token).await;
    response.assert_not_found();

    // The client still receives the full error body
    let client_body: serde_json::Value = response.json();
    assert_eq!(client_body["error"], "not_found");

    let row = app.wait_for_audit_row(&response.trace_id().unwrap()).await;
    assert_eq!(row.response_status, Some(404));
    assert_eq!(
        row.error_message.as_deref(),
        Some("Not found: Incident 999999 not found")
    );

    let data = row.response_data.expect("error payload should be captured");
    assert_eq!(data["error"], "not_found");
}

#[tokio::test]
async fn test_rejected_authentication_is_audited() {
    let app = TestApp::new().await;

    let response = app.get("/api/v1/incidents").await;
    response.assert_unauthorized();

    let row = app.wait_for_audit_row(&response.trace_id().unwrap()).await;
    assert_eq!(row.response_status, Some(401));
    assert_eq!(
        row.error_message.as_deref(),
        Some("Missing authentication token")
    );
    assert!(row.user_id.is_none());
}

#[tokio::test]
async fn test_oversized_body_replaced_by_marker() {
    let app = TestApp::new().await;
    let user = app.seed_user("oncall@example.com", "password123", false).await;
    let token = app.token_for(&user);

    let payload = json!({
        "title": "Big one",
        "description": "A".repeat(20_000)
    });
    let expected_size = payload.to_string().len();

    let response = app
        .post_json_with_auth("/api/v1/incidents", payload, &token)
        .await;
    // The handler still sees the full body
    response.assert_created();

    let row = app.wait_for_audit_row(&response.trace_id().unwrap()).await;
    let body = row.request_body.expect("marker should be recorded");

    assert_eq!(body["_truncated"], true);
    assert_eq!(body["_size"], expected_size);
    assert!(body.get("description").is_none());
}

#[tokio::test]
async fn test_skip_list_paths_are_not_audited() {
    let app = TestApp::new().await;

    let health = app.get("/health").await;
    health.assert_ok();
    assert!(health.trace_id().is_none());

    app.get("/health/ready").await.assert_ok();
    app.get("/ping").await.assert_ok();

    // Let one audited request flow through so the pipeline has provably
    // drained before we check for absence
    let audited = app.get("/api/v1/incidents").await;
    app.wait_for_audit_row(&audited.trace_id().unwrap()).await;

    assert!(app.audit_rows_for_path("/health").await.is_empty());
    assert!(app.audit_rows_for_path("/health/ready").await.is_empty());
    assert!(app.audit_rows_for_path("/ping").await.is_empty());
}

#[tokio::test]
async fn test_query_params_captured_and_scrubbed() {
    let app = TestApp::new().await;
    let user = app.seed_user("oncall@example.com", "password123", false).await;
    let token = app.token_for(&user);

    let response = app
        .get_with_auth("/api/v1/incidents?status=open&api_token=tok_secret", &token)
        .await;
    response.assert_ok();

    let row = app.wait_for_audit_row(&response.trace_id().unwrap()).await;
    let params = row.query_params.expect("query params should be captured");

    assert_eq!(params["status"], "open");
    assert_eq!(params["api_token"], "[REDACTED]");
}

#[tokio::test]
async fn test_captured_headers_follow_allow_list() {
    let app = TestApp::new().await;
    let user = app.seed_user("oncall@example.com", "password123", false).await;
    let token = app.token_for(&user);

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/incidents")
        .header("Content-Type", "application/json")
        .header("Accept", "application/json")
        .header("Cookie", "session=abc123")
        .header("X-Custom-Header", "not captured")
        .body(axum::body::Body::from(
            json!({"title": "Header capture"}).to_string(),
        ))
        .unwrap();
    let response = app.request_with_auth(request, &token).await;
    response.assert_created();

    let row = app.wait_for_audit_row(&response.trace_id().unwrap()).await;
    let headers = row.request_headers.expect("headers should be captured");

    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(headers["accept"], "application/json");
    // Credential-bearing headers never reach the trail in the clear
    assert_eq!(headers["authorization"], "[REDACTED]");
    assert!(headers.get("cookie").is_none());
    assert!(headers.get("x-custom-header").is_none());
}

#[tokio::test]
async fn test_client_ip_from_forwarded_header() {
    let app = TestApp::new().await;

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/v1/incidents")
        .header("X-Forwarded-For", "203.0.113.9, 10.0.0.2")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.request(request).await;

    let row = app.wait_for_audit_row(&response.trace_id().unwrap()).await;
    assert_eq!(row.ip_address.as_deref(), Some("203.0.113.9"));
}

#[tokio::test]
async fn test_audit_document_reaches_log_channel() {
    let app = TestApp::new().await;
    app.seed_user("audit@example.com", "password123", false).await;

    let response = app
        .post_json(
            "/api/v1/auth/login",
            json!({"email": "audit@example.com", "password": "password123"}),
        )
        .await;
    response.assert_ok();

    let document = app
        .wait_for_audit_document(&response.trace_id().unwrap())
        .await;

    assert_eq!(document["summary"], "POST /api/v1/auth/login - 200");
    assert!(document["index"]
        .as_str()
        .unwrap()
        .starts_with("audit-test-"));
    assert_eq!(document["tags"], json!(["api", "audit", "test"]));
    assert_eq!(document["request"]["body"]["password"], "[REDACTED]");
    assert_eq!(document["metadata"]["environment"], "test");
    assert_eq!(document["response"]["status"], 200);
}

#[tokio::test]
async fn test_database_trail_disabled_still_logs_channel() {
    let mut config = test_config();
    config.audit.store_in_database = false;
    let app = TestApp::with_config(config).await;

    let response = app.get("/api/v1/incidents").await;
    let trace_id = response.trace_id().unwrap();

    // The channel document arrives even though nothing is persisted
    app.wait_for_audit_document(&trace_id).await;

    assert!(app
        .audit_rows_for_path("/api/v1/incidents")
        .await
        .is_empty());
}

#[tokio::test]
async fn test_silenced_channel_still_stores_rows() {
    let mut config = test_config();
    config.audit.log_level = "warning".to_string();
    let app = TestApp::with_config(config).await;

    let response = app.get("/api/v1/incidents").await;
    let trace_id = response.trace_id().unwrap();

    app.wait_for_audit_row(&trace_id).await;

    assert!(app.audit_output.documents().is_empty());
}

#[tokio::test]
async fn test_disabled_pipeline_records_nothing() {
    let app = TestApp::with_config(test_config_without_audit()).await;

    let response = app.get("/api/v1/incidents").await;
    response.assert_unauthorized();

    // No interceptor, no trace header
    assert!(response.trace_id().is_none());

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(app
        .audit_rows_for_path("/api/v1/incidents")
        .await
        .is_empty());
    assert!(app.audit_output.documents().is_empty());
}

#[tokio::test]
async fn test_trail_survives_rapid_fire_requests() {
    let app = TestApp::new().await;
    let user = app.seed_user("oncall@example.com", "password123", false).await;
    let token = app.token_for(&user);

    let mut trace_ids = Vec::new();
    for n in 0..10 {
        let response = app
            .post_json_with_auth(
                "/api/v1/incidents",
                json!({"title": format!("Incident {}", n), "severity": "low"}),
                &token,
            )
            .await;
        response.assert_created();
        trace_ids.push(response.trace_id().unwrap());
    }

    for trace_id in &trace_ids {
        let row = app.wait_for_audit_row(trace_id).await;
        assert_eq!(row.response_status, Some(201));
    }

    // The listing endpoint's contract is newest first
    let rows = app.audit_rows_for_path("/api/v1/incidents").await;
    assert_eq!(rows.len(), 10);
    for pair in rows.windows(2) {
        assert!(pair[0].requested_at >= pair[1].requested_at);
    }
}
