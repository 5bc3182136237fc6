//! Entry dispatcher and router.
//!
//! Every request lands in one fallback handler which picks, in order:
//! WebSocket passthrough, CORS preflight, gated GET, gated POST, or a plain
//! relay for any other method.

use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRequestParts, Request, State, ws::WebSocketUpgrade},
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{Instrument, Span};

use crate::{
    context::RequestContext,
    cors::CorsPolicy,
    error::Rejection,
    gate::{GateOutcome, gate_get, gate_post},
    relay::{Upstream, UpstreamRequest, relay_response},
    verify::Verifier,
    websocket::{bridge, is_websocket_upgrade, upstream_ws_url},
};

/// Shared, immutable state for the dispatcher.
#[derive(Clone)]
pub struct GateState {
    cors: Arc<CorsPolicy>,
    verifier: Arc<dyn Verifier>,
    upstream: Arc<dyn Upstream>,
    ws_base: Arc<str>,
    max_body_size: usize,
    debug: bool,
}

impl GateState {
    /// Assemble state from its collaborators.
    pub fn new(
        cors: CorsPolicy,
        verifier: Arc<dyn Verifier>,
        upstream: Arc<dyn Upstream>,
        ws_base: impl Into<String>,
        max_body_size: usize,
    ) -> Self {
        Self {
            cors: Arc::new(cors),
            verifier,
            upstream,
            ws_base: Arc::from(ws_base.into()),
            max_body_size,
            debug: false,
        }
    }

    /// Open a debug span around every request.
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// WebSocket base URL of the upstream node.
    pub fn ws_base(&self) -> &str {
        &self.ws_base
    }
}

impl std::fmt::Debug for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateState")
            .field("cors", &self.cors)
            .field("ws_base", &self.ws_base)
            .field("max_body_size", &self.max_body_size)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// Router sending every path and method to the dispatcher.
pub fn create_router(state: GateState) -> Router {
    Router::new().fallback(entry).with_state(state)
}

async fn entry(State(state): State<GateState>, request: Request) -> Response {
    let span = if state.debug {
        debug_span!("request", method = %request.method(), path = %request.uri().path())
    } else {
        Span::none()
    };
    dispatch(state, request).instrument(span).await
}

/// Handle one request end to end.
pub async fn dispatch(state: GateState, request: Request) -> Response {
    if is_websocket_upgrade(request.headers()) {
        return upgrade(state, request).await;
    }
    if request.method() == Method::OPTIONS {
        return state.cors.preflight(request.headers());
    }

    let cors = state.cors.headers(request.headers());
    let mut ctx = RequestContext::from_request(request, state.max_body_size);
    let verifier = state.verifier.as_ref();

    let (outcome, body) = match ctx.method().clone() {
        Method::GET => (gate_get(&ctx, verifier).await, None),
        Method::POST => {
            let body = ctx.body().await;
            (gate_post(&ctx, &body, verifier).await, Some(body))
        }
        _ => {
            let body = ctx.body().await;
            (GateOutcome::NotApplicable, Some(body).filter(|b| !b.is_empty()))
        }
    };

    match outcome {
        GateOutcome::Deny(rejection) => rejection.into_response_with(cors),
        outcome => {
            debug!(?outcome, "relaying");
            relay(&state, &ctx, body, cors).await
        }
    }
}

async fn relay(
    state: &GateState,
    ctx: &RequestContext,
    body: Option<Bytes>,
    cors: HeaderMap,
) -> Response {
    match state.upstream.forward(UpstreamRequest::from_context(ctx, body)).await {
        Ok(fetched) => relay_response(fetched, cors),
        Err(e) => {
            warn!(error = %e, path = %ctx.path(), "upstream relay failed");
            Rejection::from(e).into_response_with(cors)
        }
    }
}

async fn upgrade(state: GateState, request: Request) -> Response {
    let (mut parts, _) = request.into_parts();
    let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = upstream_ws_url(state.ws_base(), path_and_query);

    match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => {
            debug!(%url, "upgrading websocket");
            ws.on_upgrade(move |socket| bridge(socket, url))
        }
        Err(rejection) => {
            debug!(%rejection, "websocket upgrade refused");
            rejection.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{
            HeaderValue, StatusCode,
            header::{
                ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN,
                ACCESS_CONTROL_MAX_AGE, CONNECTION, CONTENT_TYPE, ORIGIN, UPGRADE,
            },
        },
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{error::RelayError, fetched::FetchedResponse, verify::Verdict};

    struct FakeVerifier {
        verdict: Verdict,
        calls: Mutex<Vec<String>>,
    }

    impl FakeVerifier {
        fn new(verified: bool, address: &str) -> Arc<Self> {
            Arc::new(Self {
                verdict: Verdict { ok: true, verified, address: address.to_string() },
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Verifier for FakeVerifier {
        async fn verify(&self, payload: String) -> Verdict {
            self.calls.lock().unwrap().push(payload);
            self.verdict.clone()
        }
    }

    struct FakeUpstream {
        fail: bool,
        seen: Mutex<Vec<UpstreamRequest>>,
    }

    impl FakeUpstream {
        fn ok() -> Arc<Self> {
            Arc::new(Self { fail: false, seen: Mutex::new(Vec::new()) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { fail: true, seen: Mutex::new(Vec::new()) })
        }

        fn seen(&self) -> Vec<UpstreamRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Upstream for FakeUpstream {
        async fn forward(&self, request: UpstreamRequest) -> Result<FetchedResponse, RelayError> {
            self.seen.lock().unwrap().push(request);
            if self.fail {
                return Err(RelayError::Url { url: "http://node".into(), reason: "down".into() });
            }
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(FetchedResponse::new(
                StatusCode::OK,
                headers,
                Bytes::from_static(br#"{"jsonrpc":"2.0","id":1,"result":{}}"#),
            ))
        }
    }

    fn router(verifier: Arc<FakeVerifier>, upstream: Arc<FakeUpstream>) -> Router {
        let state = GateState::new(
            CorsPolicy::new(86_400),
            verifier,
            upstream,
            "ws://node:26657",
            1024,
        );
        create_router(state)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn json_post(uri: &str, body: &'static str) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        let verifier = FakeVerifier::new(true, "");
        let upstream = FakeUpstream::ok();
        let app = router(verifier.clone(), upstream.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/broadcast_tx_sync")
                    .header(ORIGIN, "https://app.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example");
        assert_eq!(response.headers()[ACCESS_CONTROL_MAX_AGE], "86400");
        assert!(body_text(response).await.is_empty());
        assert!(verifier.calls().is_empty());
        assert!(upstream.seen().is_empty());
    }

    #[tokio::test]
    async fn get_non_broadcast_is_relayed_ungated() {
        let verifier = FakeVerifier::new(false, "");
        let upstream = FakeUpstream::ok();
        let app = router(verifier.clone(), upstream.clone());

        let response = app
            .oneshot(Request::builder().uri("/status?height=5").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
        assert_eq!(body_json(response).await["jsonrpc"], "2.0");
        assert!(verifier.calls().is_empty());

        let seen = upstream.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::GET);
        assert_eq!(seen[0].path_and_query, "/status?height=5");
        assert!(seen[0].body.is_none());
    }

    #[tokio::test]
    async fn get_missing_tx_is_400() {
        let verifier = FakeVerifier::new(true, "");
        let upstream = FakeUpstream::ok();
        let app = router(verifier.clone(), upstream.clone());

        let response = app
            .oneshot(Request::builder().uri("/broadcast_tx_sync").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(body_text(response).await, r#"{"error":"bad_request","detail":"missing tx"}"#);
        assert!(verifier.calls().is_empty());
        assert!(upstream.seen().is_empty());
    }

    #[tokio::test]
    async fn get_verified_broadcast_is_relayed() {
        let verifier = FakeVerifier::new(true, "twilight1xyz");
        let upstream = FakeUpstream::ok();
        let app = router(verifier.clone(), upstream.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/broadcast_tx_sync?tx=0xdead")
                    .header(ORIGIN, "https://app.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example");
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(verifier.calls().len(), 1);
        assert_eq!(upstream.seen()[0].path_and_query, "/broadcast_tx_sync?tx=0xdead");
    }

    #[tokio::test]
    async fn encoded_broadcast_paths_are_gated() {
        for uri in ["/broadcast%5Ftx%5Fsync?tx=0xdead", "/rpc/broadcast%5ftx%5fcommit?tx=0xdead"] {
            let verifier = FakeVerifier::new(false, "");
            let upstream = FakeUpstream::ok();
            let app = router(verifier.clone(), upstream.clone());

            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = app.oneshot(request).await.unwrap();

            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
            assert_eq!(verifier.calls().len(), 1, "{uri}");
            assert!(upstream.seen().is_empty(), "{uri}");
        }
    }

    #[tokio::test]
    async fn post_denied_broadcast_is_403() {
        let verifier = FakeVerifier::new(false, "abc");
        let upstream = FakeUpstream::ok();
        let app = router(verifier.clone(), upstream.clone());

        let response = app
            .oneshot(json_post(
                "/",
                r#"{"jsonrpc":"2.0","id":1,"method":"broadcast_tx_commit","params":{"tx":"AA=="}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            body_text(response).await,
            r#"{"error":"not_whitelisted","address":"abc","verified":false}"#
        );
        assert_eq!(verifier.calls().len(), 1);
        assert!(upstream.seen().is_empty());
    }

    #[tokio::test]
    async fn post_allowed_broadcast_relays_captured_body() {
        let raw = r#"{"id":7,"method":"broadcast_tx_async","params":{"tx":"AA=="}}"#;
        let verifier = FakeVerifier::new(true, "abc");
        let upstream = FakeUpstream::ok();
        let app = router(verifier.clone(), upstream.clone());

        let response = app.oneshot(json_post("/", raw)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(verifier.calls(), vec![raw.to_string()]);
        let seen = upstream.seen();
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].body.as_deref(), Some(raw.as_bytes()));
    }

    #[tokio::test]
    async fn post_status_is_relayed_ungated() {
        let verifier = FakeVerifier::new(false, "");
        let upstream = FakeUpstream::ok();
        let app = router(verifier.clone(), upstream.clone());

        let raw = r#"{"jsonrpc":"2.0","id":1,"method":"status"}"#;
        let response = app.oneshot(json_post("/", raw)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(verifier.calls().is_empty());
        assert_eq!(upstream.seen()[0].body.as_deref(), Some(raw.as_bytes()));
    }

    #[tokio::test]
    async fn other_methods_are_relayed_ungated() {
        let verifier = FakeVerifier::new(false, "");
        let upstream = FakeUpstream::ok();
        let app = router(verifier.clone(), upstream.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/broadcast_tx_sync?tx=0x01")
                    .body(Body::from("payload"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(verifier.calls().is_empty());
        let seen = upstream.seen();
        assert_eq!(seen[0].method, Method::PUT);
        assert_eq!(seen[0].body.as_deref(), Some(&b"payload"[..]));
    }

    #[tokio::test]
    async fn upstream_failure_is_502() {
        let verifier = FakeVerifier::new(true, "");
        let app = router(verifier, FakeUpstream::failing());

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(body_json(response).await["error"], "bad_gateway");
    }

    #[tokio::test]
    async fn websocket_requests_bypass_gate_and_relay() {
        let verifier = FakeVerifier::new(true, "");
        let upstream = FakeUpstream::ok();
        let app = router(verifier.clone(), upstream.clone());

        // No hyper connection behind a oneshot call, so the upgrade itself is
        // refused; the point is that nothing else runs.
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/websocket")
                    .header(CONNECTION, "upgrade")
                    .header(UPGRADE, "websocket")
                    .header("sec-websocket-version", "13")
                    .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(!response.status().is_success());
        assert!(verifier.calls().is_empty());
        assert!(upstream.seen().is_empty());
    }

    #[test]
    fn state_debug_hides_collaborators() {
        let state = GateState::new(
            CorsPolicy::default(),
            FakeVerifier::new(true, ""),
            FakeUpstream::ok(),
            "ws://node",
            16,
        )
        .with_debug(true);
        let rendered = format!("{state:?}");
        assert!(rendered.contains("ws://node"));
        assert!(rendered.contains("debug: true"));
    }
}
