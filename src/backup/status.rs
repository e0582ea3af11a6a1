// pgkeeper/src/backup/status.rs
use chrono::{DateTime, Local, TimeDelta, Utc};

use crate::backup::logic::should_backup;
use crate::config::BackupConfig;
use crate::metadata::{LoadOutcome, MetadataStore, RetentionMap};
use std::path::Path;

/// Prints the retention record of every configured database.
pub fn print_status(config: &BackupConfig) {
    let store = MetadataStore::new(&config.metadata_path);
    let (summary, records) = metadata_summary(store.path(), store.load());

    println!("{}", summary);
    println!("Interval: {} day(s)", config.interval.num_days());
    for line in status_lines(&config.databases, &records, config.interval, Utc::now()) {
        println!("{}", line);
    }
}

/// Header line describing the metadata file, plus the records to report on.
fn metadata_summary(path: &Path, outcome: LoadOutcome) -> (String, RetentionMap) {
    match outcome {
        LoadOutcome::Loaded(records) => (format!("Metadata: {}", path.display()), records),
        LoadOutcome::Missing => (
            format!("Metadata: {} (not created yet)", path.display()),
            RetentionMap::new(),
        ),
        LoadOutcome::Recovered { reason } => (
            format!("Metadata: {} (ignored, {})", path.display(), reason),
            RetentionMap::new(),
        ),
    }
}

fn format_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// One line per configured database, then one per dormant record that is no
/// longer configured.
pub fn status_lines(
    databases: &[String],
    records: &RetentionMap,
    interval: TimeDelta,
    now: DateTime<Utc>,
) -> Vec<String> {
    let configured: Vec<&str> = databases
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    let mut lines = Vec::new();

    for database_id in &configured {
        let record = records.get(*database_id).cloned().unwrap_or_default();
        let due = if should_backup(&record, interval, now) { "due" } else { "ok" };
        let line = match (record.last_backup_time, &record.last_artifact_path) {
            (Some(last), path) => format!(
                "{:<24} {:<4} last {}  next {}  file {}",
                database_id,
                due,
                format_time(last),
                format_time(last + interval),
                path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "-".to_string()),
            ),
            (None, _) => format!("{:<24} {:<4} never backed up", database_id, due),
        };
        lines.push(line);
    }

    for (database_id, record) in records {
        if configured.contains(&database_id.as_str()) {
            continue;
        }
        let last = record
            .last_backup_time
            .map(format_time)
            .unwrap_or_else(|| "never".to_string());
        lines.push(format!("{:<24} -    not configured (last {})", database_id, last));
    }

    lines
}
