//! Trace and request ID correlation
//!
//! Every audited request is tagged with two identifiers: a trace ID that can
//! be supplied by the caller (and is echoed back), and a request ID that is
//! always freshly minted. Caller-supplied trace IDs are validated before use
//! so upstream systems cannot inject arbitrary bytes into logs.

use axum::http::HeaderMap;
use chrono::Utc;
use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use uuid::Uuid;

/// Header carrying the trace ID on requests and responses
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Accepted trace ID shape: alphanumerics and hyphens only
static TRACE_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9-]+$").unwrap()
});

/// Per-request correlation identifiers, inserted into request extensions by
/// the audit middleware so handlers can tag their own logs.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
    pub request_id: String,
}

impl<S> axum::extract::FromRequestParts<S> for TraceContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        // Requests on exempt paths never get a context; fall back to a fresh
        // pair so handler logging stays usable.
        Ok(parts.extensions.get::<TraceContext>().cloned().unwrap_or_else(|| {
            TraceContext {
                trace_id: TraceCorrelator::new().generate_trace_id(),
                request_id: TraceCorrelator::generate_request_id(),
            }
        }))
    }
}

/// Mints and validates correlation identifiers
#[derive(Debug, Clone)]
pub struct TraceCorrelator {
    hostname: String,
}

impl TraceCorrelator {
    /// Create a correlator using the operating system hostname
    pub fn new() -> Self {
        Self {
            hostname: os_hostname(),
        }
    }

    /// Create a correlator with a fixed host identifier
    pub fn with_hostname(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }

    /// The hostname this correlator stamps into generated trace IDs
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Validate a caller-supplied trace ID
    pub fn is_valid_trace_id(value: &str) -> bool {
        !value.is_empty() && TRACE_ID_REGEX.is_match(value)
    }

    /// Return the caller's trace ID when present and well formed, otherwise
    /// mint a new one
    pub fn extract_or_generate(&self, headers: &HeaderMap) -> String {
        headers
            .get(TRACE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| Self::is_valid_trace_id(v))
            .map(|v| v.to_string())
            .unwrap_or_else(|| self.generate_trace_id())
    }

    /// Mint a trace ID: UTC timestamp, host prefix, random suffix
    pub fn generate_trace_id(&self) -> String {
        let timestamp = Utc::now().format("%Y%m%d%H%M%S");
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        format!("{}-{}-{}", timestamp, self.host_prefix(), suffix)
    }

    /// Mint a request ID (always a fresh UUID)
    pub fn generate_request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// First characters of the hostname, restricted to alphanumerics so a
    /// minted ID always has exactly three hyphen-joined components
    fn host_prefix(&self) -> String {
        let prefix: String = self
            .hostname
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(8)
            .collect();
        if prefix.is_empty() {
            "unknown".to_string()
        } else {
            prefix
        }
    }
}

impl Default for TraceCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the operating system hostname
pub fn os_hostname() -> String {
    let mut buf = [0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if ret != 0 {
        return "unknown".to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
