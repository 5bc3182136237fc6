//! Per-request authorization decision for transaction broadcasts.
//!
//! Only broadcast calls are gated: `GET .../broadcast_tx_*?tx=..` and JSON-RPC
//! POSTs whose `method` is one of the broadcast methods. Everything else is
//! [`GateOutcome::NotApplicable`] and is relayed untouched, including bodies
//! that do not parse. Broadcasts are allowed only on a positive oracle verdict.

use bytes::Bytes;

use crate::{
    codec::{self, BroadcastMethod},
    context::RequestContext,
    error::Rejection,
    verify::Verifier,
};

const JSON_CONTENT_TYPE: &str = "application/json";

/// What the gate decided for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// A broadcast the oracle verified.
    Allow,
    /// A broadcast that must not reach the node.
    Deny(Rejection),
    /// Not a broadcast; the gate has no opinion.
    NotApplicable,
}

impl GateOutcome {
    /// Whether the request goes on to the relay.
    pub const fn proceeds(&self) -> bool {
        !matches!(self, Self::Deny(_))
    }
}

/// Gate a GET request.
///
/// Broadcast paths need a non-empty `tx` argument, either `0x`-hex (converted
/// to base64) or base64 as-is, which is wrapped in a `broadcast_tx_sync`
/// request for the oracle.
pub async fn gate_get(ctx: &RequestContext, verifier: &dyn Verifier) -> GateOutcome {
    let Some(method) = BroadcastMethod::from_path(ctx.path()) else {
        return GateOutcome::NotApplicable;
    };

    let tx = ctx.query_arg("tx").unwrap_or_default();
    if tx.is_empty() {
        debug!(%method, "broadcast without tx argument");
        return GateOutcome::Deny(Rejection::bad_request("missing tx"));
    }

    let tx = if codec::is_hex_tx(tx) {
        match codec::hex_to_base64(tx) {
            Ok(encoded) => encoded,
            Err(e) => return GateOutcome::Deny(Rejection::bad_request(e.to_string())),
        }
    } else {
        tx.to_string()
    };

    let verdict = verifier.verify(codec::broadcast_sync_payload(&tx)).await;
    decide(method, verdict.is_allowed(), verdict.address)
}

/// Gate a POST request whose body has already been captured.
///
/// Only `application/json` bodies naming a broadcast method are gated; the
/// original body is what the oracle sees.
pub async fn gate_post(
    ctx: &RequestContext,
    body: &Bytes,
    verifier: &dyn Verifier,
) -> GateOutcome {
    if !ctx.content_type().contains(JSON_CONTENT_TYPE) {
        return GateOutcome::NotApplicable;
    }

    let Some(envelope) = codec::parse_envelope(body) else {
        debug!(len = body.len(), "unparseable JSON body; not gating");
        return GateOutcome::NotApplicable;
    };
    let Some(method) = envelope.broadcast_method() else {
        return GateOutcome::NotApplicable;
    };

    let payload = String::from_utf8_lossy(body).into_owned();
    let verdict = verifier.verify(payload).await;
    decide(method, verdict.is_allowed(), verdict.address)
}

fn decide(method: BroadcastMethod, allowed: bool, address: String) -> GateOutcome {
    if allowed {
        debug!(%method, address = %address, "broadcast allowed");
        GateOutcome::Allow
    } else {
        info!(%method, address = %address, "broadcast denied");
        GateOutcome::Deny(Rejection::not_whitelisted(address))
    }
}
