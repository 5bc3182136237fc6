//! Authorization oracle client and verdict interpretation.
//!
//! The oracle is asked exactly once per gated request. Its reply is reduced to
//! a [`Verdict`]; anything short of a successful, parseable, verified reply is
//! a denial. How the verdict object maps to "verified" is a pluggable
//! [`VerdictPolicy`] chosen in configuration.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fetched::FetchedResponse;

/// Outcome of one oracle call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    /// The oracle call itself succeeded and returned parseable JSON.
    pub ok: bool,
    /// The oracle verified the sender. Only meaningful when `ok` is true.
    pub verified: bool,
    /// Address the oracle resolved, or empty.
    pub address: String,
}

impl Verdict {
    /// The verdict for a failed oracle call.
    pub fn failed() -> Self {
        Self::default()
    }

    /// Whether the request may proceed. Fails closed.
    pub const fn is_allowed(&self) -> bool {
        self.ok && self.verified
    }
}

/// A policy's reading of a verdict object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The sender is allowed to broadcast.
    Verified,
    /// The sender is not allowed to broadcast.
    Denied,
}

/// Maps the oracle's verdict object to a [`Decision`].
pub trait VerdictPolicy: Send + Sync + fmt::Debug {
    /// Policy name, as written in configuration.
    fn name(&self) -> &'static str;

    /// Decide on the (already `result`-unwrapped) verdict object.
    fn decide(&self, verdict: &Value) -> Decision;
}

/// Verified iff `verified` is boolean `true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifiedFlag;

impl VerdictPolicy for VerifiedFlag {
    fn name(&self) -> &'static str {
        "verified_flag"
    }

    fn decide(&self, verdict: &Value) -> Decision {
        if verdict.get("verified") == Some(&Value::Bool(true)) {
            Decision::Verified
        } else {
            Decision::Denied
        }
    }
}

/// Like [`VerifiedFlag`], but a verdict with `is_kyc_mandatory: false` is
/// verified regardless of its `verified` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct KycOptional;

impl VerdictPolicy for KycOptional {
    fn name(&self) -> &'static str {
        "kyc_optional"
    }

    fn decide(&self, verdict: &Value) -> Decision {
        if verdict.get("is_kyc_mandatory") == Some(&Value::Bool(false)) {
            return Decision::Verified;
        }
        VerifiedFlag.decide(verdict)
    }
}

/// Configuration selector for the built-in policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// [`VerifiedFlag`].
    #[default]
    VerifiedFlag,
    /// [`KycOptional`].
    KycOptional,
}

impl PolicyKind {
    /// Instantiate the selected policy.
    pub fn build(self) -> Arc<dyn VerdictPolicy> {
        match self {
            Self::VerifiedFlag => Arc::new(VerifiedFlag),
            Self::KycOptional => Arc::new(KycOptional),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VerifiedFlag => write!(f, "verified_flag"),
            Self::KycOptional => write!(f, "kyc_optional"),
        }
    }
}

/// Reduce an oracle reply to a [`Verdict`].
///
/// Non-2xx, empty or non-JSON replies fail. A truthy `result` member holds
/// the verdict object; otherwise the top level does. A string `result` that
/// itself parses as JSON is unwrapped, since JSON-RPC oracles return the
/// verdict encoded as a string.
pub fn interpret(response: &FetchedResponse, policy: &dyn VerdictPolicy) -> Verdict {
    if !response.status.is_success() {
        debug!(status = %response.status, "oracle returned non-success status");
        return Verdict::failed();
    }
    let Some(body) = response.body.as_ref() else {
        debug!("oracle returned an empty body");
        return Verdict::failed();
    };

    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            let preview = String::from_utf8_lossy(&body[..body.len().min(200)]);
            warn!(error = %e, body = %preview, "oracle returned unparseable JSON");
            return Verdict::failed();
        }
    };

    let verdict = verdict_object(value);
    let address = verdict.get("address").and_then(Value::as_str).unwrap_or_default().to_string();
    let verified = policy.decide(&verdict) == Decision::Verified;

    debug!(verified, address = %address, policy = policy.name(), "oracle verdict");
    Verdict { ok: true, verified, address }
}

fn verdict_object(mut value: Value) -> Value {
    match value.get_mut("result").map(Value::take) {
        Some(Value::String(encoded)) if !encoded.is_empty() => {
            serde_json::from_str(&encoded).unwrap_or(Value::String(encoded))
        }
        Some(result) if is_truthy(&result) => result,
        Some(result) => {
            value["result"] = result;
            value
        }
        None => value,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Bool(true) | Value::Array(_) | Value::Object(_) => true,
    }
}

/// Asks the authorization oracle about a broadcast.
#[async_trait]
pub trait Verifier: Send + Sync + 'static {
    /// Send `payload` (a JSON-RPC request body) to the oracle once.
    async fn verify(&self, payload: String) -> Verdict;
}

/// Errors talking to the oracle. These never reach the caller; they become a
/// failed [`Verdict`].
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The HTTP client could not be built.
    #[error("failed to build oracle client: {0}")]
    Client(#[source] reqwest::Error),
    /// The request could not be sent or the reply not read.
    #[error("oracle request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// [`Verifier`] backed by an HTTP POST to the oracle endpoint.
#[derive(Debug, Clone)]
pub struct OracleClient {
    client: reqwest::Client,
    url: String,
    policy: Arc<dyn VerdictPolicy>,
}

impl OracleClient {
    /// Create a client for `url` with a per-call `timeout`.
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        policy: Arc<dyn VerdictPolicy>,
    ) -> Result<Self, OracleError> {
        let client =
            reqwest::Client::builder().timeout(timeout).build().map_err(OracleError::Client)?;
        Ok(Self { client, url: url.into(), policy })
    }

    /// Oracle endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Active verdict policy.
    pub fn policy(&self) -> &dyn VerdictPolicy {
        self.policy.as_ref()
    }

    async fn call(&self, payload: String) -> Result<FetchedResponse, OracleError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;
        Ok(FetchedResponse::from_reqwest(response).await?)
    }
}

#[async_trait]
impl Verifier for OracleClient {
    async fn verify(&self, payload: String) -> Verdict {
        debug!(len = payload.len(), url = %self.url, "calling oracle");
        match self.call(payload).await {
            Ok(response) => interpret(&response, self.policy.as_ref()),
            Err(e) => {
                warn!(error = %e, url = %self.url, "oracle call failed");
                Verdict::failed()
            }
        }
    }
}
