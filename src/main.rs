//! PostgreSQL backup keeper
//!
//! Backs up each configured database once its retention interval has passed
//! and removes the previous dump after the new one is recorded.

// pgkeeper/src/main.rs
mod backup;
mod config;
mod errors;
mod metadata;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::BackupConfig;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use utils::logging::init_logging;

#[derive(Debug, Parser)]
#[command(name = "pgkeeper", version, about = "Periodic PostgreSQL backups, keeping only the latest dump per database")]
struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    action: Option<Action>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Action {
    /// Back up every database whose interval has elapsed (default)
    Run,
    /// Show the last backup of each database and whether it is due
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_app(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every due database was backed up and recorded.
async fn run_app(cli: Cli) -> Result<bool> {
    match &cli.env_file {
        Some(path) => {
            dotenv::from_path(path)
                .with_context(|| format!("Failed to load environment file {}", path.display()))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }

    let config = BackupConfig::from_env().context("Failed to load backup configuration")?;

    fs::create_dir_all(&config.backup_dir).with_context(|| {
        format!("Failed to create backup directory {}", config.backup_dir.display())
    })?;

    if let Err(e) = init_logging(&config.log_file) {
        tracing::warn!(path = %config.log_file.display(), error = %e, "cannot open log file, logging to stdout only");
    }

    match cli.action.unwrap_or(Action::Run) {
        Action::Run => {
            let report = backup::run_backup_flow(&config)
                .await
                .context("Backup process failed")?;
            Ok(report.is_success())
        }
        Action::Status => {
            backup::status::print_status(&config);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::parse_from(["pgkeeper"]);
        assert!(cli.action.is_none());
        assert!(cli.env_file.is_none());
    }

    #[test]
    fn test_cli_status_with_env_file() {
        let cli = Cli::parse_from(["pgkeeper", "--env-file", "/etc/pgkeeper.env", "status"]);
        assert!(matches!(cli.action, Some(Action::Status)));
        assert_eq!(cli.env_file, Some(PathBuf::from("/etc/pgkeeper.env")));
    }
}
