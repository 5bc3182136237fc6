//! Assembling the gateway from configuration.

use std::sync::Arc;

use eyre::{Context, Result};

use crate::{
    config::GateConfig,
    cors::CorsPolicy,
    dispatch::{GateState, create_router},
    relay::{HttpUpstream, Upstream},
    verify::{OracleClient, Verifier},
};

/// Builder for the gateway router.
///
/// Collaborators default to HTTP clients built from the config; tests swap
/// them for fakes.
#[derive(Default)]
pub struct AppBuilder {
    verifier: Option<Arc<dyn Verifier>>,
    upstream: Option<Arc<dyn Upstream>>,
}

impl std::fmt::Debug for AppBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppBuilder")
            .field("custom_verifier", &self.verifier.is_some())
            .field("custom_upstream", &self.upstream.is_some())
            .finish()
    }
}

impl AppBuilder {
    /// Create a builder with default collaborators.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `verifier` instead of an [`OracleClient`].
    #[must_use]
    pub fn verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Use `upstream` instead of an [`HttpUpstream`].
    #[must_use]
    pub fn upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Build the shared dispatcher state.
    ///
    /// # Arguments
    ///
    /// * `config` - Gateway configuration; supplies the oracle and upstream clients for any
    ///   collaborator not set on the builder, plus CORS, body limit and debug settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the oracle or upstream HTTP client cannot be created.
    pub fn build_state(self, config: &GateConfig) -> Result<GateState> {
        let verifier = match self.verifier {
            Some(verifier) => verifier,
            None => {
                let policy = config.oracle.policy.build();
                let oracle = OracleClient::new(&config.oracle.url, config.oracle.timeout(), policy)
                    .wrap_err("failed to create oracle client")?;
                debug!(url = oracle.url(), policy = oracle.policy().name(), "Oracle client ready");
                Arc::new(oracle)
            }
        };

        let upstream = match self.upstream {
            Some(upstream) => upstream,
            None => {
                let upstream =
                    HttpUpstream::new(&config.upstream.http_url, config.upstream.timeout())
                        .wrap_err("failed to create upstream client")?;
                debug!(base_url = upstream.base_url(), "Upstream client ready");
                Arc::new(upstream)
            }
        };

        Ok(GateState::new(
            CorsPolicy::new(config.cors.max_age_secs),
            verifier,
            upstream,
            config.upstream.ws_base(),
            config.server.max_body_size,
        )
        .with_debug(config.logging.debug))
    }

    /// Build the router.
    pub fn build(self, config: &GateConfig) -> Result<axum::Router> {
        Ok(create_router(self.build_state(config)?))
    }
}

/// Build the router with default collaborators.
pub fn build_app(config: &GateConfig) -> Result<axum::Router> {
    AppBuilder::new().build(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GateConfig {
        GateConfig::parse(
            r#"
            [upstream]
            http_url = "https://rpc.example"

            [oracle]
            url = "http://oracle.example/"
            policy = "kyc_optional"

            [logging]
            debug = true
        "#,
        )
        .unwrap()
    }

    #[test]
    fn builds_state_from_config() {
        let state = AppBuilder::new().build_state(&config()).unwrap();
        assert_eq!(state.ws_base(), "wss://rpc.example");

        let rendered = format!("{state:?}");
        assert!(rendered.contains("debug: true"), "{rendered}");
    }

    #[test]
    fn builds_router() {
        assert!(build_app(&config()).is_ok());
    }
}
