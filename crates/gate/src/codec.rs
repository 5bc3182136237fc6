//! Transaction argument transcoding and lenient JSON-RPC envelope parsing.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use percent_encoding::percent_decode_str;
use serde_json::{Value, json};

/// The three transaction-submission methods that require authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastMethod {
    /// `broadcast_tx_sync`
    Sync,
    /// `broadcast_tx_commit`
    Commit,
    /// `broadcast_tx_async`
    Async,
}

impl BroadcastMethod {
    /// All gated methods.
    pub const ALL: [Self; 3] = [Self::Sync, Self::Commit, Self::Async];

    /// JSON-RPC method name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "broadcast_tx_sync",
            Self::Commit => "broadcast_tx_commit",
            Self::Async => "broadcast_tx_async",
        }
    }

    /// Match an exact JSON-RPC method name.
    pub fn from_method(method: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == method)
    }

    /// Match a URI path whose last segment is a broadcast method, e.g.
    /// `/rpc/broadcast_tx_commit`. The raw path is normalized first, so
    /// `/broadcast%5Ftx%5Fsync` and `//broadcast_tx_sync/` match too.
    pub fn from_path(path: &str) -> Option<Self> {
        let path = normalize_path(path);
        let (_, last) = path.rsplit_once('/')?;
        Self::from_method(last)
    }
}

impl fmt::Display for BroadcastMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The path as the node's router sees it: percent-decoded, repeated and
/// trailing slashes merged, `.` and `..` segments resolved.
pub fn normalize_path(path: &str) -> String {
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    let mut segments = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Errors produced while transcoding a transaction argument.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The argument contained a non-hex digit.
    #[error("invalid hex transaction: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Whether `arg` is a `0x`-prefixed, non-empty run of hex digits.
///
/// Anything else is taken to be base64 already.
pub fn is_hex_tx(arg: &str) -> bool {
    arg.strip_prefix("0x")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Convert a hex string to standard (RFC 4648, padded) base64.
///
/// A leading `0x`/`0X` is stripped and an odd digit count is left-padded
/// with a single `0`. Empty input gives empty output.
pub fn hex_to_base64(hex: &str) -> Result<String, CodecError> {
    let hex = hex.trim();
    let digits = match hex.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("0x") => &hex[2..],
        _ => hex,
    };

    let bytes = if digits.len() % 2 == 1 {
        hex::decode(format!("0{digits}"))?
    } else {
        hex::decode(digits)?
    };

    Ok(STANDARD.encode(bytes))
}

/// The fields of a JSON-RPC request the gate cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonRpcEnvelope {
    /// `method`, or empty when absent or not a string.
    pub method: String,
    /// `params.tx`, falling back to `params.tx_bytes`.
    pub tx: Option<Value>,
    /// `id`, if any.
    pub id: Option<Value>,
}

impl JsonRpcEnvelope {
    /// The broadcast method this envelope calls, if it calls one.
    pub fn broadcast_method(&self) -> Option<BroadcastMethod> {
        BroadcastMethod::from_method(&self.method)
    }
}

/// Parse `body` as a JSON-RPC envelope.
///
/// Returns `None` when the body is not JSON at all. Any JSON document is
/// "recognized"; missing fields simply come back empty.
pub fn parse_envelope(body: &[u8]) -> Option<JsonRpcEnvelope> {
    let value: Value = serde_json::from_slice(body).ok()?;

    let method = value.get("method").and_then(Value::as_str).unwrap_or_default().to_string();
    let tx = value.get("params").and_then(|params| {
        [params.get("tx"), params.get("tx_bytes")]
            .into_iter()
            .flatten()
            .find(|v| is_present(v))
            .cloned()
    });
    let id = value.get("id").filter(|v| !v.is_null()).cloned();

    Some(JsonRpcEnvelope { method, tx, id })
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Build the `broadcast_tx_sync` request sent to the oracle for a GET-style
/// submission.
pub fn broadcast_sync_payload(tx_base64: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": BroadcastMethod::Sync.as_str(),
        "params": { "tx": tx_base64 },
    })
    .to_string()
}
