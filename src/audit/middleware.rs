//! Request audit interceptor
//!
//! Wraps every inbound API request: assigns the trace context, captures a
//! filtered snapshot of the request, lets the handler run untouched, captures
//! response facts, then hands the finished entry to the dispatch queue. The
//! interceptor is a pure observer. It never alters the handler's outcome and
//! no capture failure ever surfaces to the caller; the only visible effect is
//! the `X-Trace-ID` response header.

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use crate::audit::entry::{AuditEntry, AuditMetadata};
use crate::audit::filter::REDACTED;
use crate::audit::trace::{TraceContext, TraceCorrelator, TRACE_ID_HEADER};
use crate::middleware::AuthUser;
use crate::AppState;

/// Request headers copied into the audit entry
const CAPTURED_REQUEST_HEADERS: [&str; 4] =
    ["content-type", "accept", "accept-language", "authorization"];

/// Headers whose values are never recorded, independent of the field filter
const SENSITIVE_HEADERS: [&str; 2] = ["authorization", "cookie"];

/// Longest raw-text excerpt kept from a non-JSON error body
const MAX_RAW_ERROR_CHARS: usize = 1000;

/// Audit every non-exempt request passing through the router
pub async fn audit_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    // Exempt paths bypass all audit work, including trace assignment
    if state.config.audit.is_exempt_path(request.uri().path()) {
        return next.run(request).await;
    }

    let started = Instant::now();

    let trace_id = state.correlator.extract_or_generate(request.headers());
    let request_id = TraceCorrelator::generate_request_id();

    // Downstream handlers read the trace from the request; the validated
    // value replaces whatever the client sent
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        request.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    request.extensions_mut().insert(TraceContext {
        trace_id: trace_id.clone(),
        request_id: request_id.clone(),
    });

    let mut entry = begin_entry(&state, &trace_id, &request_id, &request);

    if matches!(request.method().as_str(), "POST" | "PUT" | "PATCH") {
        request = capture_request_body(&state, &mut entry, request).await;
    }

    let mut response = next.run(request).await;

    // The auth layer mirrors the verified principal into response
    // extensions; anonymous requests simply leave these fields empty
    if let Some(user) = response.extensions().get::<AuthUser>() {
        entry.user_id = Some(user.id);
        entry.user_email = Some(user.email.clone());
    }

    let status = response.status();
    entry.response_status = Some(status.as_u16());

    if status.is_success() {
        use hyper::body::Body as _;
        entry.response_size_bytes = response.body().size_hint().exact();
    } else {
        response = capture_error_response(&state, &mut entry, response).await;
    }

    entry.responded_at = Some(Utc::now());
    entry.response_time_ms = Some(started.elapsed().as_millis() as u64);
    entry.metadata = Some(AuditMetadata {
        environment: state.config.environment.clone(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        hostname: state.correlator.hostname().to_string(),
    });

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }

    state.audit.dispatch(entry);

    response
}

/// Request-phase fields, captured before the handler runs
fn begin_entry(
    state: &AppState,
    trace_id: &str,
    request_id: &str,
    request: &Request,
) -> AuditEntry {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let endpoint = full_url(request);

    let mut entry = AuditEntry::begin(trace_id, request_id, &method, &endpoint, &path);
    entry.ip_address = client_ip(request);
    entry.user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    entry.query_params = captured_query_params(state, request.uri().query());
    entry.request_headers = captured_headers(request.headers());
    entry
}

/// Reconstruct the full request URL from forwarded-proto and host headers
fn full_url(request: &Request) -> String {
    let scheme = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{}://{}{}", scheme, host, request.uri())
}

/// Best-effort client address: proxy headers first, then the socket peer
fn client_ip(request: &Request) -> Option<String> {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    if let Some(real_ip) = request
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
    {
        return Some(real_ip.to_string());
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Decode the query string into a filtered map, `None` when empty
fn captured_query_params(state: &AppState, query: Option<&str>) -> Option<Value> {
    let query = query?;
    let mut params = serde_json::Map::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();
        let key = urlencoding::decode(key)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| key.to_string());
        let value = urlencoding::decode(value)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| value.to_string());
        params.insert(key, Value::String(value));
    }
    if params.is_empty() {
        return None;
    }
    Some(state.filter.filter(&Value::Object(params)))
}

/// Copy the allow-listed headers, hard-redacting credential carriers
fn captured_headers(headers: &HeaderMap) -> Option<Value> {
    let mut captured = serde_json::Map::new();
    for name in CAPTURED_REQUEST_HEADERS {
        if let Some(value) = headers.get(name) {
            let rendered = if SENSITIVE_HEADERS.contains(&name) {
                REDACTED.to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            captured.insert(name.to_string(), Value::String(rendered));
        }
    }
    if captured.is_empty() {
        return None;
    }
    Some(Value::Object(captured))
}

fn declared_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Buffer the request body for the audit snapshot and hand it back intact
///
/// Oversized payloads are recorded as a truncation marker with the original
/// byte count, never as partial content. Bodies that do not parse as JSON
/// are left unrecorded.
async fn capture_request_body(
    state: &AppState,
    entry: &mut AuditEntry,
    request: Request,
) -> Request {
    let max = state.config.audit.max_body_bytes;

    // A declared oversize length skips buffering entirely
    if let Some(declared) = declared_content_length(request.headers()) {
        if declared > max as u64 {
            entry.request_body = Some(AuditEntry::truncation_marker(declared as usize));
            return request;
        }
    }

    let (parts, body) = request.into_parts();
    match to_bytes(body, usize::MAX).await {
        Ok(bytes) => {
            if bytes.len() > max {
                entry.request_body = Some(AuditEntry::truncation_marker(bytes.len()));
            } else if !bytes.is_empty() {
                if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
                    entry.request_body = Some(state.filter.filter(&value));
                }
            }
            Request::from_parts(parts, Body::from(bytes))
        }
        Err(e) => {
            debug!(error = %e, "Request body could not be read for audit");
            Request::from_parts(parts, Body::empty())
        }
    }
}

/// Buffer a non-2xx response to extract an error message and data snapshot,
/// then rebuild it byte-for-byte
async fn capture_error_response(
    state: &AppState,
    entry: &mut AuditEntry,
    response: Response,
) -> Response {
    let max = state.config.audit.max_body_bytes;
    let (parts, body) = response.into_parts();

    match to_bytes(body, usize::MAX).await {
        Ok(bytes) => {
            entry.response_size_bytes = Some(bytes.len() as u64);
            if bytes.is_empty() {
                entry.error_message = status_text(parts.status);
            } else {
                match serde_json::from_slice::<Value>(&bytes) {
                    Ok(value) => {
                        entry.error_message = error_message_from(&value, parts.status);
                        entry.response_data = if bytes.len() > max {
                            Some(AuditEntry::truncation_marker(bytes.len()))
                        } else {
                            Some(state.filter.filter(&value))
                        };
                    }
                    Err(_) => {
                        entry.error_message = status_text(parts.status);
                        let excerpt: String = String::from_utf8_lossy(&bytes)
                            .chars()
                            .take(MAX_RAW_ERROR_CHARS)
                            .collect();
                        entry.response_data = Some(json!({ "_raw": excerpt }));
                    }
                }
            }
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(e) => {
            debug!(error = %e, "Response body could not be read for audit");
            entry.error_message = status_text(parts.status);
            Response::from_parts(parts, Body::empty())
        }
    }
}

/// Error text from a JSON body, preferring `message` over `error`, with the
/// standard reason phrase as the fallback
fn error_message_from(value: &Value, status: StatusCode) -> Option<String> {
    value
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| value.get("error").and_then(Value::as_str))
        .map(String::from)
        .or_else(|| status_text(status))
}

fn status_text(status: StatusCode) -> Option<String> {
    status
        .canonical_reason()
        .map(String::from)
        .or_else(|| Some(format!("HTTP {}", status.as_u16())))
}
