//! WebSocket passthrough to the upstream node.
//!
//! Upgrades bypass the gate entirely. The client socket is bridged frame by
//! frame to a fresh upstream connection until either side closes.

use axum::{
    extract::ws::{self, WebSocket},
    http::{HeaderMap, header::UPGRADE},
};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite};

/// Whether the request asks to upgrade to a WebSocket.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
}

/// Upstream WebSocket URL for an inbound `path_and_query`.
pub fn upstream_ws_url(ws_base: &str, path_and_query: &str) -> String {
    format!("{}{}", ws_base.trim_end_matches('/'), path_and_query)
}

/// Pump frames between `client` and the upstream at `upstream_url`.
pub async fn bridge(mut client: WebSocket, upstream_url: String) {
    let upstream = match connect_async(upstream_url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!(url = %upstream_url, error = %e, "upstream websocket connect failed");
            let _ = client.send(ws::Message::Close(None)).await;
            return;
        }
    };
    debug!(url = %upstream_url, "websocket bridged");

    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(Ok(msg)) = client_rx.next().await {
            let closing = matches!(msg, ws::Message::Close(_));
            if upstream_tx.send(to_upstream(msg)).await.is_err() || closing {
                break;
            }
        }
        let _ = upstream_tx.close().await;
    };

    let upstream_to_client = async {
        while let Some(Ok(msg)) = upstream_rx.next().await {
            let Some(msg) = to_client(msg) else { continue };
            let closing = matches!(msg, ws::Message::Close(_));
            if client_tx.send(msg).await.is_err() || closing {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        _ = client_to_upstream => debug!(url = %upstream_url, "client side closed"),
        _ = upstream_to_client => debug!(url = %upstream_url, "upstream side closed"),
    }
}

fn to_upstream(msg: ws::Message) -> tungstenite::Message {
    match msg {
        ws::Message::Text(text) => tungstenite::Message::text(text.as_str()),
        ws::Message::Binary(data) => tungstenite::Message::Binary(data),
        ws::Message::Ping(data) => tungstenite::Message::Ping(data),
        ws::Message::Pong(data) => tungstenite::Message::Pong(data),
        ws::Message::Close(frame) => {
            tungstenite::Message::Close(frame.map(|f| tungstenite::protocol::CloseFrame {
                code: f.code.into(),
                reason: f.reason.as_str().into(),
            }))
        }
    }
}

fn to_client(msg: tungstenite::Message) -> Option<ws::Message> {
    Some(match msg {
        tungstenite::Message::Text(text) => ws::Message::Text(text.as_str().into()),
        tungstenite::Message::Binary(data) => ws::Message::Binary(data),
        tungstenite::Message::Ping(data) => ws::Message::Ping(data),
        tungstenite::Message::Pong(data) => ws::Message::Pong(data),
        tungstenite::Message::Close(frame) => ws::Message::Close(frame.map(|f| ws::CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().into(),
        })),
        tungstenite::Message::Frame(_) => return None,
    })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn detects_upgrade_case_insensitively() {
        for value in ["websocket", "WebSocket", "WEBSOCKET"] {
            let mut headers = HeaderMap::new();
            headers.insert(UPGRADE, HeaderValue::from_static(value));
            assert!(is_websocket_upgrade(&headers), "{value}");
        }

        let mut headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));
        headers.insert(UPGRADE, HeaderValue::from_static("h2c"));
        assert!(!is_websocket_upgrade(&headers));
    }

    #[test]
    fn builds_upstream_url() {
        assert_eq!(upstream_ws_url("ws://node:26657/", "/websocket"), "ws://node:26657/websocket");
        assert_eq!(upstream_ws_url("wss://node", "/ws?x=1"), "wss://node/ws?x=1");
    }

    #[test]
    fn frames_convert_both_ways() {
        let msg = to_upstream(ws::Message::Text("{\"method\":\"subscribe\"}".into()));
        assert_eq!(msg.to_text().unwrap(), "{\"method\":\"subscribe\"}");

        let back = to_client(tungstenite::Message::Binary(vec![1u8, 2, 3].into())).unwrap();
        assert_eq!(back, ws::Message::Binary(vec![1u8, 2, 3].into()));

        let close = to_client(tungstenite::Message::Close(Some(tungstenite::protocol::CloseFrame {
            code: 1000.into(),
            reason: "bye".into(),
        })))
        .unwrap();
        match close {
            ws::Message::Close(Some(frame)) => {
                assert_eq!(frame.code, 1000);
                assert_eq!(frame.reason.as_str(), "bye");
            }
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}
