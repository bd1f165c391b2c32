//! Spin up a full application instance against a temporary database, with
//! the audit log channel redirected into an in-memory capture buffer.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{body::Body, http::Request, Router};
use tower::ServiceExt;
use uuid::Uuid;

use incidenthub::{
    app_router,
    audit::{spawn_workers, AuditDispatcher, AuditLogChannel},
    config::{AppConfig, AuditConfig, AuthConfig, DatabaseConfig, LoggingConfig, ServerConfig},
    db::{self, AuditLogRepository},
    middleware::auth::create_access_token,
    models::{AuditLogQuery, AuditLogRecord, User},
    services::AuthService,
    AppState,
};

/// In-memory writer capturing everything the audit channel emits
#[derive(Clone, Default)]
pub struct AuditCapture(Arc<Mutex<Vec<u8>>>);

impl AuditCapture {
    /// Raw captured output
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }

    /// Parsed audit documents, one per emitted line
    pub fn documents(&self) -> Vec<serde_json::Value> {
        self.contents()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

impl io::Write for AuditCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Test application wrapper for integration testing
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub audit_output: AuditCapture,
}

impl TestApp {
    /// Create a new test application with a temporary SQLite database
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Create a new test application with custom configuration
    pub async fn with_config(config: AppConfig) -> Self {
        // Initialize temporary database
        let db = db::init_pool(&config.database)
            .await
            .expect("Failed to initialize test database");

        // Wire the audit pipeline against a captured channel instead of a
        // log file, mirroring the startup wiring
        let audit_output = AuditCapture::default();
        let dispatcher = if config.audit.enabled {
            let channel = if config.audit.log_channel_enabled() {
                let (writer, guard) = tracing_appender::non_blocking(audit_output.clone());
                AuditLogChannel::for_writer(writer, guard)
            } else {
                AuditLogChannel::disabled()
            };
            spawn_workers(&config.audit, db.clone(), channel)
        } else {
            AuditDispatcher::null()
        };

        // Create application state
        let state = AppState::new(config, db, dispatcher);

        // Build the router
        let router = app_router(state.clone());

        Self {
            router,
            state,
            audit_output,
        }
    }

    /// Create a user directly in the database
    pub async fn seed_user(&self, email: &str, password: &str, is_admin: bool) -> User {
        let service = AuthService::new(self.state.db.clone());
        service
            .create_user(email, password, "Test User", is_admin)
            .await
            .expect("Failed to seed test user")
    }

    /// Issue a bearer token for a user without going through login
    pub fn token_for(&self, user: &User) -> String {
        create_access_token(
            user.id,
            &user.email,
            user.is_admin,
            &self.state.config.auth.jwt_secret,
            self.state.config.auth.token_expiry_hours,
        )
        .expect("Failed to generate test token")
    }

    /// Make a GET request to the test application
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Make an authenticated GET request
    pub async fn get_with_auth(&self, uri: &str, token: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.request_with_auth(request, token).await
    }

    /// Make a POST request with JSON body
    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> TestResponse {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Make an authenticated POST request with JSON body
    pub async fn post_json_with_auth(
        &self,
        uri: &str,
        body: serde_json::Value,
        token: &str,
    ) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.request_with_auth(request, token).await
    }

    /// Make an authenticated PUT request with JSON body
    pub async fn put_json_with_auth(
        &self,
        uri: &str,
        body: serde_json::Value,
        token: &str,
    ) -> TestResponse {
        let request = Request::builder()
            .method("PUT")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.request_with_auth(request, token).await
    }

    /// Make an authenticated DELETE request
    pub async fn delete_with_auth(&self, uri: &str, token: &str) -> TestResponse {
        let request = Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.request_with_auth(request, token).await
    }

    /// Make a request with authentication
    pub async fn request_with_auth(&self, request: Request<Body>, token: &str) -> TestResponse {
        let (mut parts, body) = request.into_parts();
        parts.headers.insert(
            "Authorization",
            format!("Bearer {}", token).parse().unwrap(),
        );
        self.request(Request::from_parts(parts, body)).await
    }

    /// Make an arbitrary request
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Poll the audit trail until the row for a trace id lands
    pub async fn wait_for_audit_row(&self, trace_id: &str) -> AuditLogRecord {
        for _ in 0..200 {
            let rows = AuditLogRepository::new(&self.state.db)
                .find_by_trace_id(trace_id)
                .await
                .expect("Failed to query audit trail");
            if let Some(row) = rows.into_iter().next() {
                return row;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Audit row for trace id {} never arrived", trace_id);
    }

    /// Poll the captured channel output until the document for a trace id
    /// appears
    pub async fn wait_for_audit_document(&self, trace_id: &str) -> serde_json::Value {
        for _ in 0..200 {
            if let Some(document) = self
                .audit_output
                .documents()
                .into_iter()
                .find(|d| d["trace_id"] == trace_id)
            {
                return document;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Audit document for trace id {} never appeared", trace_id);
    }

    /// Persisted audit rows recorded for an exact request path
    pub async fn audit_rows_for_path(&self, path: &str) -> Vec<AuditLogRecord> {
        AuditLogRepository::new(&self.state.db)
            .list(&AuditLogQuery {
                path: Some(path.to_string()),
                ..AuditLogQuery::default()
            })
            .await
            .expect("Failed to query audit trail")
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: axum::http::StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: bytes::Bytes,
}

impl TestResponse {
    /// Get the response body as a string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Parse the response body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse response as JSON")
    }

    /// The trace id echoed back on the response, if any
    pub fn trace_id(&self) -> Option<String> {
        self.headers
            .get("x-trace-id")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    }

    /// Check if the response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Assert the response status
    pub fn assert_status(&self, expected: axum::http::StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Assert the response status is OK (200)
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::OK)
    }

    /// Assert the response status is Created (201)
    pub fn assert_created(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::CREATED)
    }

    /// Assert the response status is Bad Request (400)
    pub fn assert_bad_request(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::BAD_REQUEST)
    }

    /// Assert the response status is Unauthorized (401)
    pub fn assert_unauthorized(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::UNAUTHORIZED)
    }

    /// Assert the response status is Forbidden (403)
    pub fn assert_forbidden(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::FORBIDDEN)
    }

    /// Assert the response status is Not Found (404)
    pub fn assert_not_found(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::NOT_FOUND)
    }
}

/// Create a test configuration with temporary SQLite database
pub fn test_config() -> AppConfig {
    // Use a unique temp file for each test to avoid conflicts
    let db_path = format!(
        "/tmp/incidenthub_test_{}.db",
        Uuid::new_v4().to_string().replace('-', "")
    );

    AppConfig {
        environment: "test".to_string(),
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000, // Test port
            workers: 1,
        },
        auth: AuthConfig {
            jwt_secret: "test_secret_key_that_is_at_least_32_bytes_long".to_string(),
            token_expiry_hours: 24,
            password_min_length: 8,
        },
        database: DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", db_path),
            max_connections: 1,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
        },
        logging: LoggingConfig::default(),
        audit: AuditConfig {
            workers: 1, // Deterministic dispatch order in tests
            queue_capacity: 64,
            ..AuditConfig::default()
        },
    }
}

/// Create a test configuration with the audit pipeline disabled
pub fn test_config_without_audit() -> AppConfig {
    let mut config = test_config();
    config.audit.enabled = false;
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_creation() {
        let app = TestApp::new().await;
        assert!(app.state.config.audit.enabled);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = TestApp::new().await;
        let response = app.get("/health").await;
        response.assert_ok();
    }

    #[tokio::test]
    async fn test_response_json_parsing() {
        let app = TestApp::new().await;
        let response = app.get("/health").await;
        let json: serde_json::Value = response.json();
        assert!(json.get("status").is_some());
    }
}
