//! Tracing setup.

use clap::ValueEnum;
use tracing_subscriber::{EnvFilter, filter::Directive};

use crate::config::GateConfig;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Build the filter for `level`, raising this crate to `debug` when
/// request tracing is on. An unparseable level falls back to `info`.
pub fn build_filter(level: &str, debug: bool) -> eyre::Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    if debug {
        let directive: Directive = "txgate=debug"
            .parse()
            .map_err(|e| eyre::eyre!("invalid debug directive: {e}"))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// Install the global subscriber.
pub fn init_tracing(level: &str, format: LogFormat, debug: bool) -> eyre::Result<()> {
    let filter = build_filter(level, debug)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| eyre::eyre!("failed to initialize tracing: {e}"))
}

/// Log the effective configuration once at startup.
pub fn log_config_summary(config: &GateConfig) {
    info!(
        bind = %config.server.bind_addr(),
        max_body_size = config.server.max_body_size,
        "Server configuration"
    );
    info!(
        http = %config.upstream.http_url,
        ws = %config.upstream.ws_base(),
        timeout_ms = config.upstream.timeout_ms,
        "Upstream node"
    );
    info!(
        url = %config.oracle.url,
        timeout_ms = config.oracle.timeout_ms,
        policy = %config.oracle.policy,
        "Authorization oracle"
    );
    if config.logging.debug {
        info!("Request tracing enabled");
    }
}
