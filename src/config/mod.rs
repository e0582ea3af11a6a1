// pgkeeper/src/config/mod.rs
use anyhow::{Context, Result};
use chrono::TimeDelta;
use std::path::PathBuf;

use crate::utils::databases::DEFAULT_DATABASES;

pub const DEFAULT_BACKUP_DIR: &str = "./backups";
pub const METADATA_FILE_NAME: &str = "backup_metadata.json";
pub const LOG_FILE_NAME: &str = "backup.log";
pub const DEFAULT_INTERVAL_DAYS: i64 = 3;

/// Connection parameters for the PostgreSQL server being backed up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

/// How backup artifacts are produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpStrategy {
    /// Run `pg_dump` on this host against `ConnectionConfig::host`.
    Direct,
    /// Run `pg_dump` inside a container and copy the artifact out.
    Docker { container: String },
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub backup_dir: PathBuf,
    pub metadata_path: PathBuf,
    pub log_file: PathBuf,
    pub interval: TimeDelta,
    pub connection: ConnectionConfig,
    pub databases: Vec<String>,
    pub strategy: DumpStrategy,
}

impl BackupConfig {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    /// Unset and empty values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backup_dir = PathBuf::from(get("BACKUP_DIR").unwrap_or_else(|| DEFAULT_BACKUP_DIR.to_string()));
        let metadata_path = backup_dir.join(METADATA_FILE_NAME);
        let log_file = get("BACKUP_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| backup_dir.join(LOG_FILE_NAME));

        let interval_days = match get("BACKUP_INTERVAL_DAYS") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("BACKUP_INTERVAL_DAYS must be a non-negative whole number of days, got '{}'", raw))?
                as i64,
            None => DEFAULT_INTERVAL_DAYS,
        };

        let port = match get("DB_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("DB_PORT must be a valid port number, got '{}'", raw))?,
            None => 5432,
        };

        let connection = ConnectionConfig {
            host: get("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
            port,
            user: get("DB_USER").unwrap_or_else(|| "postgres".to_string()),
            // Passwords are not trimmed.
            password: lookup("DB_PASSWORD")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "postgres".to_string()),
        };

        let databases = match get("DB_NAMES") {
            Some(raw) => parse_database_list(&raw)?,
            None => DEFAULT_DATABASES.iter().map(|s| s.to_string()).collect(),
        };

        let strategy = if parse_flag(get("USE_DOCKER").as_deref()) {
            DumpStrategy::Docker {
                container: get("DOCKER_CONTAINER").unwrap_or_else(|| "postgres".to_string()),
            }
        } else {
            DumpStrategy::Direct
        };

        Ok(BackupConfig {
            backup_dir,
            metadata_path,
            log_file,
            interval: TimeDelta::days(interval_days),
            connection,
            databases,
            strategy,
        })
    }

    /// Same as [`BackupConfig::from_lookup`] but over a fixed map.
    #[cfg(test)]
    pub fn from_map(vars: &std::collections::HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }
}

fn parse_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.to_ascii_lowercase()).as_deref(),
        Some("true" | "1" | "yes")
    )
}

/// Parses the comma-separated `DB_NAMES` list.
/// Blank entries are dropped; anything but ASCII alphanumerics, `_` and `-` is rejected.
fn parse_database_list(raw: &str) -> Result<Vec<String>> {
    let databases: Vec<String> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();

    if let Some(bad) = databases
        .iter()
        .find(|name| name.contains(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-'))
    {
        anyhow::bail!("Invalid character in database name '{}'. Check the DB_NAMES env var.", bad);
    }

    Ok(databases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() -> anyhow::Result<()> {
        let config = BackupConfig::from_map(&HashMap::new())?;

        assert_eq!(config.backup_dir, PathBuf::from("./backups"));
        assert_eq!(config.metadata_path, PathBuf::from("./backups").join("backup_metadata.json"));
        assert_eq!(config.log_file, PathBuf::from("./backups").join("backup.log"));
        assert_eq!(config.interval, TimeDelta::days(3));
        assert_eq!(
            config.connection,
            ConnectionConfig {
                host: "localhost".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: "postgres".to_string(),
            }
        );
        assert_eq!(config.databases.len(), DEFAULT_DATABASES.len());
        assert_eq!(config.strategy, DumpStrategy::Direct);
        Ok(())
    }

    #[test]
    fn test_overrides() -> anyhow::Result<()> {
        let config = BackupConfig::from_map(&vars(&[
            ("BACKUP_DIR", "/var/backups/pg"),
            ("BACKUP_INTERVAL_DAYS", "7"),
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("DB_USER", "backup"),
            ("DB_PASSWORD", " s3cret "),
            ("DB_NAMES", "alpha, beta,,gamma-db "),
            ("USE_DOCKER", "TRUE"),
            ("DOCKER_CONTAINER", "pg16"),
            ("BACKUP_LOG_FILE", "/var/log/pgkeeper.log"),
        ]))?;

        assert_eq!(config.metadata_path, PathBuf::from("/var/backups/pg/backup_metadata.json"));
        assert_eq!(config.log_file, PathBuf::from("/var/log/pgkeeper.log"));
        assert_eq!(config.interval, TimeDelta::days(7));
        assert_eq!(config.connection.host, "db.internal");
        assert_eq!(config.connection.port, 6543);
        assert_eq!(config.connection.user, "backup");
        assert_eq!(config.connection.password, " s3cret ");
        assert_eq!(config.databases, vec!["alpha", "beta", "gamma-db"]);
        assert_eq!(config.strategy, DumpStrategy::Docker { container: "pg16".to_string() });
        Ok(())
    }

    #[test]
    fn test_docker_container_defaults_to_postgres() -> anyhow::Result<()> {
        let config = BackupConfig::from_map(&vars(&[("USE_DOCKER", "yes")]))?;
        assert_eq!(config.strategy, DumpStrategy::Docker { container: "postgres".to_string() });

        let config = BackupConfig::from_map(&vars(&[("USE_DOCKER", "false")]))?;
        assert_eq!(config.strategy, DumpStrategy::Direct);
        Ok(())
    }

    #[test]
    fn test_zero_interval_is_allowed() -> anyhow::Result<()> {
        let config = BackupConfig::from_map(&vars(&[("BACKUP_INTERVAL_DAYS", "0")]))?;
        assert_eq!(config.interval, TimeDelta::zero());
        Ok(())
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(BackupConfig::from_map(&vars(&[("DB_PORT", "not-a-port")])).is_err());
        assert!(BackupConfig::from_map(&vars(&[("DB_PORT", "70000")])).is_err());
        assert!(BackupConfig::from_map(&vars(&[("BACKUP_INTERVAL_DAYS", "-1")])).is_err());
        assert!(BackupConfig::from_map(&vars(&[("BACKUP_INTERVAL_DAYS", "three")])).is_err());
        assert!(BackupConfig::from_map(&vars(&[("DB_NAMES", "alpha,bad;name")])).is_err());
    }

    #[test]
    fn test_parse_database_list_skips_blank_entries() -> anyhow::Result<()> {
        assert_eq!(parse_database_list(" , alpha ,, ")?, vec!["alpha"]);
        assert!(parse_database_list(" , ")?.is_empty());
        Ok(())
    }
}
