//! Boundary representation of a collaborator's HTTP reply.

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;

/// A reply from the oracle or the upstream node, captured once with every
/// field the gate may look at.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body; `None` when the reply had no body bytes.
    pub body: Option<Bytes>,
}

impl FetchedResponse {
    /// Build a response, normalizing an empty body to `None`.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        let body = (!body.is_empty()).then_some(body);
        Self { status, headers, body }
    }

    /// Drain a `reqwest` response into a [`FetchedResponse`].
    pub async fn from_reqwest(response: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Self::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_none() {
        let empty = FetchedResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::new());
        assert!(empty.body.is_none());

        let full =
            FetchedResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::from_static(b"{}"));
        assert_eq!(full.body.as_deref(), Some(&b"{}"[..]));
    }
}
