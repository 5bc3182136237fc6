#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod builder;
pub use builder::{AppBuilder, build_app};

mod cli;
pub use cli::Cli;

pub mod body;
pub use body::{BodyExtractor, BodySource, BufferedBody, BufferedSource, StreamSource};

pub mod codec;
pub use codec::{BroadcastMethod, CodecError, JsonRpcEnvelope, hex_to_base64, parse_envelope};

pub mod config;
pub use config::{ConfigError, GateConfig};

mod context;
pub use context::RequestContext;

pub mod cors;
pub use cors::CorsPolicy;

mod dispatch;
pub use dispatch::{GateState, create_router, dispatch};

pub mod error;
pub use error::{ErrorBody, RelayError, Rejection};

mod fetched;
pub use fetched::FetchedResponse;

pub mod gate;
pub use gate::{GateOutcome, gate_get, gate_post};

mod logging;
pub use logging::{LogFormat, init_tracing, log_config_summary};

pub mod relay;
pub use relay::{HttpUpstream, Upstream, UpstreamRequest};

mod server;
pub use server::{run_server, serve};

pub mod verify;
pub use verify::{
    Decision, KycOptional, OracleClient, OracleError, PolicyKind, Verdict, VerdictPolicy,
    Verifier, VerifiedFlag,
};

pub mod websocket;

pub use clap;
pub use eyre;
