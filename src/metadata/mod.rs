// pgkeeper/src/metadata/mod.rs
//! Persisted retention records, one per database.
//!
//! The document is a JSON object keyed by database identifier and lives next
//! to the artifacts it describes:
//!
//! ```json
//! {
//!   "alpha": {
//!     "last_backup": "2026-10-16T08:30:00.123456Z",
//!     "last_backup_file": "./backups/alpha_backup_20261016_083000.dump"
//!   }
//! }
//! ```

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::errors::Result;

/// Retention state for a single database. The database identifier is the key
/// of the enclosing [`RetentionMap`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRecord {
    #[serde(
        rename = "last_backup",
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_backup_time: Option<DateTime<Utc>>,

    #[serde(
        rename = "last_backup_file",
        default,
        deserialize_with = "lenient_path",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_artifact_path: Option<PathBuf>,
}

pub type RetentionMap = BTreeMap<String, RetentionRecord>;

/// Result of reading the metadata file. Loading never fails: a missing or
/// unusable file simply means there is no backup history.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(RetentionMap),
    Missing,
    Recovered { reason: String },
}

impl LoadOutcome {
    pub fn into_records(self) -> RetentionMap {
        match self {
            LoadOutcome::Loaded(records) => records,
            LoadOutcome::Missing | LoadOutcome::Recovered { .. } => RetentionMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MetadataStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted records.
    pub fn load(&self) -> LoadOutcome {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no metadata file yet, starting with empty history");
                return LoadOutcome::Missing;
            }
            Err(e) => {
                let reason = format!("failed to read {}: {}", self.path.display(), e);
                tracing::warn!(%reason, "metadata unreadable, starting with empty history");
                return LoadOutcome::Recovered { reason };
            }
        };

        match serde_json::from_str::<RetentionMap>(&content) {
            Ok(records) => {
                tracing::debug!(path = %self.path.display(), records = records.len(), "loaded metadata");
                LoadOutcome::Loaded(records)
            }
            Err(e) => {
                let reason = format!("malformed metadata in {}: {}", self.path.display(), e);
                tracing::warn!(%reason, "metadata file corrupted, starting with empty history");
                LoadOutcome::Recovered { reason }
            }
        }
    }

    /// Writes the full mapping, replacing the previous document.
    ///
    /// The JSON is written to a temporary file in the same directory and then
    /// renamed over the target, so readers see either the old or the new
    /// document.
    pub fn save(&self, records: &RetentionMap) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, records)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!(path = %self.path.display(), records = records.len(), "saved metadata");
        Ok(())
    }
}

/// Parses a stored backup time.
///
/// Accepts RFC 3339 with any offset, and naive `YYYY-MM-DDTHH:MM:SS[.f]`
/// values, which are taken as local time.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
}

// A bad timestamp only costs that database its history; the rest of the file still loads.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(|v| v.as_str()).and_then(parse_timestamp))
}

fn lenient_path<'de, D>(deserializer: D) -> std::result::Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from))
}
