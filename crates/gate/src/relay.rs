//! Forwarding gated requests to the upstream node.

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderName, HeaderValue, Method,
        header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST},
    },
    response::Response,
};
use bytes::Bytes;

use crate::{context::RequestContext, error::RelayError, fetched::FetchedResponse};

const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Headers that describe a single hop and must not be forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A request as it will be sent upstream.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// Original method.
    pub method: Method,
    /// Original path and query, e.g. `/status?height=1`.
    pub path_and_query: String,
    /// Inbound headers minus hop-by-hop headers and `Host`.
    pub headers: HeaderMap,
    /// Captured body, if the method carries one.
    pub body: Option<Bytes>,
}

impl UpstreamRequest {
    /// Describe `ctx` for forwarding with an optional pre-captured body.
    pub fn from_context(ctx: &RequestContext, body: Option<Bytes>) -> Self {
        Self {
            method: ctx.method().clone(),
            path_and_query: ctx.path_and_query().to_string(),
            headers: forwardable_headers(ctx.headers()),
            body,
        }
    }
}

fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_forwardable(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Whether an inbound header is passed on to the upstream node. `Host` and
/// `Content-Length` are recomputed by the client for the upstream hop.
pub fn is_forwardable(name: &HeaderName) -> bool {
    *name != HOST && *name != CONTENT_LENGTH && !HOP_BY_HOP.contains(&name.as_str())
}

/// The upstream node.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    /// Send `request` and capture the reply.
    async fn forward(&self, request: UpstreamRequest) -> Result<FetchedResponse, RelayError>;
}

/// [`Upstream`] over plain HTTP.
///
/// The client does not decompress, so compressed bodies and their
/// `Content-Encoding` pass through unchanged.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpstream {
    /// Create an upstream rooted at `base_url` with a per-call `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RelayError> {
        let client =
            reqwest::Client::builder().timeout(timeout).build().map_err(RelayError::Client)?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full upstream URL for `path_and_query`.
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn forward(&self, request: UpstreamRequest) -> Result<FetchedResponse, RelayError> {
        let url = self.url_for(&request.path_and_query);
        let url = reqwest::Url::parse(&url)
            .map_err(|e| RelayError::Url { url: url.clone(), reason: e.to_string() })?;

        debug!(method = %request.method, %url, "relaying upstream");
        let mut builder = self.client.request(request.method, url).headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        Ok(FetchedResponse::from_reqwest(response).await?)
    }
}

/// Turn an upstream reply into the caller's response: status, content type
/// (defaulting to JSON), content encoding and body bytes, then CORS on top.
pub fn relay_response(fetched: FetchedResponse, cors: HeaderMap) -> Response {
    let content_type = fetched
        .headers
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let content_encoding = fetched.headers.get(CONTENT_ENCODING).cloned();

    let mut response = Response::new(Body::from(fetched.body.unwrap_or_default()));
    *response.status_mut() = fetched.status;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, content_type);
    if let Some(encoding) = content_encoding {
        headers.insert(CONTENT_ENCODING, encoding);
    }
    headers.extend(cors);
    response
}
