//! Error types and the JSON error bodies returned to callers.

use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Wire error codes.
pub mod error_codes {
    /// Malformed or incomplete gated request.
    pub const BAD_REQUEST: &str = "bad_request";
    /// The oracle did not verify the sender.
    pub const NOT_WHITELISTED: &str = "not_whitelisted";
    /// The upstream node could not be reached.
    pub const BAD_GATEWAY: &str = "bad_gateway";
}

/// A request the gate terminates itself instead of relaying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// 400 with a reason, e.g. `missing tx`.
    BadRequest {
        /// Human-readable reason.
        detail: String,
    },
    /// 403: the oracle denied the broadcast or could not be asked.
    NotWhitelisted {
        /// Address reported by the oracle, or empty.
        address: String,
    },
    /// 502: the relay call to the upstream node failed.
    BadGateway {
        /// Human-readable reason.
        detail: String,
    },
}

impl Rejection {
    /// 400 `bad_request`.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::BadRequest { detail: detail.into() }
    }

    /// 403 `not_whitelisted`.
    pub fn not_whitelisted(address: impl Into<String>) -> Self {
        Self::NotWhitelisted { address: address.into() }
    }

    /// HTTP status for this rejection.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotWhitelisted { .. } => StatusCode::FORBIDDEN,
            Self::BadGateway { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// JSON body for this rejection.
    pub fn body(&self) -> ErrorBody<'_> {
        match self {
            Self::BadRequest { detail } => {
                ErrorBody::Detail { error: error_codes::BAD_REQUEST, detail: detail.as_str() }
            }
            Self::NotWhitelisted { address } => ErrorBody::Denied {
                error: error_codes::NOT_WHITELISTED,
                address: address.as_str(),
                verified: false,
            },
            Self::BadGateway { detail } => {
                ErrorBody::Detail { error: error_codes::BAD_GATEWAY, detail: detail.as_str() }
            }
        }
    }

    /// Render with the given CORS headers layered on top.
    pub fn into_response_with(self, cors: HeaderMap) -> Response {
        let mut response = self.into_response();
        response.headers_mut().extend(cors);
        response
    }
}

/// Serialized error body. Field order is part of the wire format.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ErrorBody<'a> {
    /// `{"error":..,"detail":..}`
    Detail {
        /// Error code.
        error: &'static str,
        /// Reason.
        detail: &'a str,
    },
    /// `{"error":..,"address":..,"verified":false}`
    Denied {
        /// Error code.
        error: &'static str,
        /// Oracle-reported address.
        address: &'a str,
        /// Always false.
        verified: bool,
    },
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Errors relaying a request to the upstream node.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The HTTP client could not be built.
    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),
    /// The upstream URL could not be formed from the request.
    #[error("invalid upstream url {url}: {reason}")]
    Url {
        /// Attempted URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Connecting, sending, or reading the reply failed.
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl From<RelayError> for Rejection {
    fn from(err: RelayError) -> Self {
        Self::BadGateway { detail: err.to_string() }
    }
}
