//! txgate - allow-list gate for transaction broadcasts.

use clap::Parser;
use eyre::{Context, Result};
use txgate::{Cli, GateConfig, build_app, check_config, init_tracing, log_config_summary};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = GateConfig::from_file(&cli.config)
        .wrap_err_with(|| format!("failed to load config from {}", cli.config.display()))?;
    config.logging.debug |= cli.debug;

    init_tracing(&cli.log_level, cli.log_format, config.logging.debug)?;
    tracing::info!(config_path = %cli.config.display(), "Configuration loaded");

    check_config!(cli);

    log_config_summary(&config);

    let app = build_app(&config)?;
    txgate::run_server(app, &config).await
}
