pub(crate) mod db_dump;
pub(crate) mod logic;
pub(crate) mod status;

use anyhow::Result;

use crate::config::{BackupConfig, DumpStrategy};
use crate::metadata::MetadataStore;
use crate::utils::setting::check_db_connection;
use db_dump::DumpBackend;
use logic::{CycleReport, RetentionScheduler};

/// Public entry point for the backup process: one pass over every configured
/// database, backing up the ones that are due.
pub async fn run_backup_flow(config: &BackupConfig) -> Result<CycleReport> {
    tracing::info!("{}", "=".repeat(60));
    tracing::info!(
        backup_dir = %config.backup_dir.display(),
        interval_days = config.interval.num_days(),
        databases = config.databases.len(),
        "starting database backup process"
    );

    match &config.strategy {
        DumpStrategy::Docker { container } => {
            tracing::info!(%container, "using Docker container");
        }
        DumpStrategy::Direct => match config.databases.iter().find(|db| !db.trim().is_empty()) {
            Some(first) => {
                if !check_db_connection(&config.connection, first).await {
                    tracing::warn!("database server is not reachable, backups are likely to fail");
                }
            }
            None => tracing::warn!("no databases configured, nothing to back up"),
        },
    }

    let store = MetadataStore::new(&config.metadata_path);
    let mut records = store.load().into_records();
    let backend = DumpBackend::from_config(config);
    let scheduler = RetentionScheduler::new(config.interval);

    let report = scheduler
        .run_backup_cycle(&config.databases, &store, &mut records, &backend)
        .await;

    tracing::info!(
        backed_up = report.backed_up.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        cleanup_failures = report.cleanup_failures.len(),
        "backup process completed"
    );
    for (database, error) in report.failed.iter().chain(report.persist_failures.iter()) {
        tracing::error!(%database, %error, "database not backed up");
    }
    tracing::info!("{}", "=".repeat(60));

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_socket_directory_host_still_runs_every_database() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let socket_dir = dir.path().join("run").join("postgresql");
        let vars: HashMap<String, String> = [
            ("BACKUP_DIR", dir.path().to_string_lossy().into_owned()),
            ("DB_HOST", socket_dir.to_string_lossy().into_owned()),
            ("DB_NAMES", "alpha".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let config = BackupConfig::from_map(&vars)?;

        let report = run_backup_flow(&config).await?;

        // No server behind the socket, so the dump itself fails, but it is attempted.
        assert_eq!(report.backed_up.len() + report.failed.len(), 1);
        assert!(report.skipped.is_empty());
        Ok(())
    }
}
