//! Command-line interface for the gateway binary.

use std::path::PathBuf;

use clap::Parser;

use crate::logging::LogFormat;

/// Return `Ok(())` from the enclosing function when `--check` was passed.
///
/// Use after the configuration has been loaded and validated:
///
/// ```ignore
/// let cli = Cli::parse();
/// let config = GateConfig::from_file(&cli.config)?;
/// check_config!(cli);
/// ```
#[macro_export]
macro_rules! check_config {
    ($cli:expr) => {
        if $cli.check {
            println!("Configuration is valid");
            return Ok(());
        }
    };
}

/// Allow-list gate for transaction broadcasts.
#[derive(Parser, Debug, Clone)]
#[command(name = "txgate")]
#[command(about = "Allow-list gate for transaction broadcasts in front of a JSON-RPC node")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "TXGATE_CONFIG", default_value = "txgate.toml")]
    pub config: PathBuf,

    /// Log level or filter (trace, debug, info, warn, error)
    #[arg(short, long, env = "TXGATE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Trace every request and gating decision
    #[arg(long)]
    pub debug: bool,

    /// Validate config and exit
    #[arg(long)]
    pub check: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::parse_from([
            "txgate",
            "--config",
            "gate.toml",
            "--log-level",
            "debug",
            "--log-format",
            "json",
        ]);
        assert_eq!(cli.config, PathBuf::from("gate.toml"));
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(!cli.debug);
        assert!(!cli.check);
    }

    #[test]
    fn test_cli_parse_flags() {
        let cli = Cli::parse_from(["txgate", "-c", "x.toml", "--check", "--debug"]);
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert!(cli.check);
        assert!(cli.debug);
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["txgate", "--log-format", "xml"]).is_err());
    }
}
