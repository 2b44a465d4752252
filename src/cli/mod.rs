//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Harvest using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Harvest - KoboToolbox to PostgreSQL ETL Tool
#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(version, about, long_about = None)]
#[command(author = "Harvest Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "harvest.toml", env = "HARVEST_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "HARVEST_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync forms, submissions and attachments into the configured database
    Sync(commands::sync::SyncArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show committed watermarks
    Status(commands::status::StatusArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_sync() {
        let cli = Cli::parse_from(["harvest", "sync"]);
        assert_eq!(cli.config, "harvest.toml");
        assert!(matches!(cli.command, Commands::Sync(_)));
    }

    #[test]
    fn test_cli_parse_sync_overrides() {
        let cli = Cli::parse_from([
            "harvest",
            "sync",
            "--yes",
            "--dry-run",
            "--disposition",
            "append",
            "--parallel",
            "8",
        ]);
        match cli.command {
            Commands::Sync(args) => {
                assert!(args.yes);
                assert!(args.dry_run);
                assert_eq!(args.disposition.as_deref(), Some("append"));
                assert_eq!(args.parallel, Some(8));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["harvest", "--config", "custom.toml", "sync"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["harvest", "--log-level", "debug", "sync"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["harvest", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["harvest", "status", "--resource", "kobo_submission"]);
        match cli.command {
            Commands::Status(args) => assert_eq!(args.resource.as_deref(), Some("kobo_submission")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["harvest", "init", "--force"]);
        assert!(matches!(cli.command, Commands::Init(args) if args.force));
    }
}
