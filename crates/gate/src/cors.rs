//! Cross-origin response headers and preflight handling.

use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderValue, Response, StatusCode,
        header::{
            ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
            ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
            ACCESS_CONTROL_REQUEST_HEADERS, ORIGIN, VARY,
        },
    },
};

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const DEFAULT_ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Computes CORS headers from the caller's `Origin` and requested headers.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    max_age: HeaderValue,
}

impl CorsPolicy {
    /// Create a policy whose preflight responses are cacheable for
    /// `max_age_secs`.
    pub fn new(max_age_secs: u64) -> Self {
        Self { max_age: HeaderValue::from(max_age_secs) }
    }

    /// Headers to attach to any response for a request carrying `request`.
    pub fn headers(&self, request: &HeaderMap) -> HeaderMap {
        let mut out = HeaderMap::new();
        self.apply(request, &mut out);
        out
    }

    /// Layer CORS headers onto `response`, replacing any the upstream set.
    pub fn apply(&self, request: &HeaderMap, response: &mut HeaderMap) {
        match request.get(ORIGIN) {
            Some(origin) => {
                response.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
                response.insert(VARY, HeaderValue::from_static("Origin"));
                response.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
            }
            None => {
                response.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
                response.remove(ACCESS_CONTROL_ALLOW_CREDENTIALS);
            }
        }

        response.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));

        let allow_headers = request
            .get(ACCESS_CONTROL_REQUEST_HEADERS)
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOW_HEADERS));
        response.insert(ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);
    }

    /// Answer an `OPTIONS` preflight: 204, empty body, no upstream call.
    pub fn preflight(&self, request: &HeaderMap) -> Response<Body> {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;

        let headers = response.headers_mut();
        self.apply(request, headers);
        headers.insert(ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        response
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_PREFLIGHT_MAX_AGE)
    }
}
