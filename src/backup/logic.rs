// pgkeeper/src/backup/logic.rs
use chrono::{DateTime, TimeDelta, Utc};
use std::path::PathBuf;

use crate::backup::db_dump::ArtifactBackend;
use crate::metadata::{MetadataStore, RetentionMap, RetentionRecord};

/// Returns true when a database has never been backed up, or when at least
/// `interval` has elapsed since its last backup.
///
/// A last-backup time in the future is treated as recent.
pub fn should_backup(record: &RetentionRecord, interval: TimeDelta, now: DateTime<Utc>) -> bool {
    match record.last_backup_time {
        None => true,
        Some(last) => now.signed_duration_since(last) >= interval,
    }
}

/// What happened to each database during one pass.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub backed_up: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Databases whose new record could not be written to disk.
    pub persist_failures: Vec<(String, String)>,
    /// Superseded artifacts that could not be removed.
    pub cleanup_failures: Vec<(PathBuf, String)>,
}

impl CycleReport {
    /// Cleanup failures do not count: the new backup is already committed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.persist_failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetentionScheduler {
    interval: TimeDelta,
}

impl RetentionScheduler {
    pub fn new(interval: TimeDelta) -> Self {
        RetentionScheduler { interval }
    }

    /// Backs up every due database in `databases`, one at a time.
    ///
    /// Per database: create the new artifact, record and persist it, and only
    /// then delete the artifact it replaces. A failure at any step is logged
    /// and confined to that database.
    pub async fn run_backup_cycle<B: ArtifactBackend>(
        &self,
        databases: &[String],
        store: &MetadataStore,
        records: &mut RetentionMap,
        backend: &B,
    ) -> CycleReport {
        let mut report = CycleReport::default();
        // Superseded artifacts whose replacement is in memory but not yet on disk.
        let mut unrecorded: Vec<(String, PathBuf)> = Vec::new();

        for database_id in databases.iter().map(|s| s.trim()) {
            if database_id.is_empty() {
                continue;
            }
            tracing::info!(database = %database_id, "processing database");
            self.backup_database(database_id, store, records, backend, &mut unrecorded, &mut report)
                .await;
        }

        for (database_id, old) in &unrecorded {
            tracing::warn!(
                database = %database_id,
                path = %old.display(),
                "metadata never saved this run, old backup is kept"
            );
        }

        report
    }

    async fn backup_database<B: ArtifactBackend>(
        &self,
        database_id: &str,
        store: &MetadataStore,
        records: &mut RetentionMap,
        backend: &B,
        unrecorded: &mut Vec<(String, PathBuf)>,
        report: &mut CycleReport,
    ) {
        let record = records.get(database_id).cloned().unwrap_or_default();

        if !should_backup(&record, self.interval, Utc::now()) {
            tracing::info!(
                database = %database_id,
                last_backup = ?record.last_backup_time,
                "skipping backup, not yet due"
            );
            report.skipped.push(database_id.to_string());
            return;
        }

        let previous_artifact = record.last_artifact_path.clone();

        let new_artifact = match backend.create(database_id).await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(
                    database = %database_id,
                    error = %e,
                    "failed to create backup, keeping old backup if it exists"
                );
                report.failed.push((database_id.to_string(), e.to_string()));
                return;
            }
        };

        let superseded = match previous_artifact {
            Some(old) if old == new_artifact => {
                tracing::debug!(database = %database_id, path = %old.display(), "new backup reused the old path");
                None
            }
            other => other,
        };

        records.insert(
            database_id.to_string(),
            RetentionRecord {
                last_backup_time: Some(Utc::now()),
                last_artifact_path: Some(new_artifact),
            },
        );
        report.backed_up.push(database_id.to_string());

        if let Err(e) = store.save(records) {
            tracing::error!(
                database = %database_id,
                path = %store.path().display(),
                error = %e,
                "failed to save metadata, old backup is kept"
            );
            report.persist_failures.push((database_id.to_string(), e.to_string()));
            if let Some(old) = superseded {
                unrecorded.push((database_id.to_string(), old));
            }
            return;
        }

        // This save also recorded every earlier replacement that failed to persist.
        let mut to_delete: Vec<(String, PathBuf)> = unrecorded.drain(..).collect();
        if let Some(old) = superseded {
            to_delete.push((database_id.to_string(), old));
        }

        for (owner, old) in to_delete {
            if let Err(e) = backend.delete(&old).await {
                tracing::error!(
                    database = %owner,
                    path = %old.display(),
                    error = %e,
                    "failed to delete old backup"
                );
                report.cleanup_failures.push((old, e.to_string()));
            }
        }
    }
}
