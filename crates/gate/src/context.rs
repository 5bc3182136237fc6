//! Per-request state shared by the gate and relay stages.

use axum::{
    extract::Request,
    http::{HeaderMap, Method, Uri, header::CONTENT_TYPE},
};
use bytes::Bytes;

use crate::body::BodyExtractor;

/// Everything the gate and relay need from an inbound request.
///
/// Built once per request. The body is read through the owned
/// [`BodyExtractor`], so it is pulled off the transport at most once no matter
/// how many stages look at it.
#[derive(Debug)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: BodyExtractor,
}

impl RequestContext {
    /// Split an axum request into a context.
    pub fn from_request(request: Request, max_body_size: usize) -> Self {
        let (mut parts, body) = request.into_parts();
        let body = BodyExtractor::for_request(body, &mut parts.extensions, max_body_size);
        Self { method: parts.method, uri: parts.uri, headers: parts.headers, body }
    }

    /// Request method.
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Request URI.
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// URI path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string, without the `?`.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Path plus `?query` when there is one.
    pub fn path_and_query(&self) -> &str {
        self.uri.path_and_query().map_or_else(|| self.uri.path(), |pq| pq.as_str())
    }

    /// Raw, undecoded value of the first `name=` query argument.
    pub fn query_arg(&self, name: &str) -> Option<&str> {
        self.query()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then_some(value)
        })
    }

    /// Inbound headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Lower-cased `Content-Type`, empty when absent or not ASCII.
    pub fn content_type(&self) -> String {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    /// The request body, captured on first use.
    pub async fn body(&mut self) -> Bytes {
        self.body.read().await
    }

    /// How many times the underlying transport was read.
    pub const fn body_reads(&self) -> usize {
        self.body.transport_reads()
    }
}
