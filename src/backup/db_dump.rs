// pgkeeper/src/backup/db_dump.rs
use chrono::Local;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

use crate::config::{BackupConfig, ConnectionConfig, DumpStrategy};
use crate::errors::{BackupError, Result};
use crate::utils::find_executable;

/// Produces and removes backup artifacts for the scheduler.
// Only used through generics inside this crate, so the futures need no `Send` bound.
#[allow(async_fn_in_trait)]
pub trait ArtifactBackend {
    /// Dumps `database_id` into a new artifact and returns its path.
    async fn create(&self, database_id: &str) -> Result<PathBuf>;

    /// Removes a superseded artifact. A missing file is not an error.
    async fn delete(&self, artifact: &Path) -> Result<()> {
        remove_artifact(artifact).await
    }
}

/// `<database>_backup_<timestamp>.dump`
pub fn artifact_file_name(database_id: &str, timestamp: &str) -> String {
    format!("{}_backup_{}.dump", database_id, timestamp)
}

fn timestamp_now() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

pub async fn remove_artifact(artifact: &Path) -> Result<()> {
    match tokio::fs::remove_file(artifact).await {
        Ok(()) => {
            tracing::info!(path = %artifact.display(), "deleted old backup");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %artifact.display(), "old backup file not found, nothing to delete");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn command_error(tool: &str, output: &Output) -> BackupError {
    BackupError::Command {
        tool: tool.to_string(),
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

// pg_dump can leave a truncated file behind when it fails midway.
async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial dump"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove partial dump"),
    }
}

/// Checks the artifact landed on disk and logs its size.
async fn confirm_artifact(path: &Path) -> Result<PathBuf> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {
            let size_mb = format!("{:.2}", meta.len() as f64 / 1024.0 / 1024.0);
            tracing::info!(path = %path.display(), %size_mb, "backup created successfully");
            Ok(path.to_path_buf())
        }
        Ok(_) => Err(BackupError::MissingArtifact(path.to_path_buf())),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(BackupError::MissingArtifact(path.to_path_buf())),
        Err(e) => Err(e.into()),
    }
}

/// Runs `pg_dump` on this host against a reachable server.
#[derive(Debug, Clone)]
pub struct PgDumpBackend {
    backup_dir: PathBuf,
    connection: ConnectionConfig,
    program: String,
}

impl PgDumpBackend {
    pub fn new(backup_dir: impl Into<PathBuf>, connection: ConnectionConfig) -> Self {
        PgDumpBackend {
            backup_dir: backup_dir.into(),
            connection,
            program: "pg_dump".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments for a custom-format dump. The password goes through `PGPASSWORD`.
    fn dump_args(&self, database_id: &str, output_path: &Path) -> Vec<String> {
        vec![
            "-h".to_string(),
            self.connection.host.clone(),
            "-p".to_string(),
            self.connection.port.to_string(),
            "-U".to_string(),
            self.connection.user.clone(),
            "-d".to_string(),
            database_id.to_string(),
            "-F".to_string(),
            "c".to_string(),
            "-f".to_string(),
            output_path.to_string_lossy().into_owned(),
        ]
    }
}

impl ArtifactBackend for PgDumpBackend {
    async fn create(&self, database_id: &str) -> Result<PathBuf> {
        let pg_dump = find_executable(&self.program)?;
        let output_path = self
            .backup_dir
            .join(artifact_file_name(database_id, &timestamp_now()));

        tracing::info!(database = %database_id, host = %self.connection.host, "creating backup");
        let output = Command::new(&pg_dump)
            .args(self.dump_args(database_id, &output_path))
            .env("PGPASSWORD", &self.connection.password)
            .output()
            .await?;

        if !output.status.success() {
            discard_partial(&output_path).await;
            return Err(command_error("pg_dump", &output));
        }

        confirm_artifact(&output_path).await
    }
}

/// Runs `pg_dump` inside a container, then copies the artifact to the host.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    backup_dir: PathBuf,
    connection: ConnectionConfig,
    container: String,
    program: String,
}

impl DockerBackend {
    pub fn new(backup_dir: impl Into<PathBuf>, connection: ConnectionConfig, container: impl Into<String>) -> Self {
        DockerBackend {
            backup_dir: backup_dir.into(),
            connection,
            container: container.into(),
            program: "docker".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    // `-e PGPASSWORD` without a value makes docker forward it from our environment.
    fn exec_dump_args(&self, database_id: &str, container_path: &str) -> Vec<String> {
        vec![
            "exec".to_string(),
            "-e".to_string(),
            "PGPASSWORD".to_string(),
            self.container.clone(),
            "pg_dump".to_string(),
            "-h".to_string(),
            "localhost".to_string(),
            "-U".to_string(),
            self.connection.user.clone(),
            "-d".to_string(),
            database_id.to_string(),
            "-F".to_string(),
            "c".to_string(),
            "-f".to_string(),
            container_path.to_string(),
        ]
    }

    fn copy_out_args(&self, container_path: &str, output_path: &Path) -> Vec<String> {
        vec![
            "cp".to_string(),
            format!("{}:{}", self.container, container_path),
            output_path.to_string_lossy().into_owned(),
        ]
    }

    async fn remove_container_file(&self, docker: &Path, container_path: &str) {
        let result = Command::new(docker)
            .args(["exec", self.container.as_str(), "rm", "-f", container_path])
            .output()
            .await;
        match result {
            Ok(output) if output.status.success() => {}
            Ok(output) => tracing::warn!(
                container = %self.container,
                path = %container_path,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "failed to remove dump inside container"
            ),
            Err(e) => tracing::warn!(container = %self.container, error = %e, "failed to run docker exec rm"),
        }
    }
}

impl ArtifactBackend for DockerBackend {
    async fn create(&self, database_id: &str) -> Result<PathBuf> {
        let docker = find_executable(&self.program)?;
        let file_name = artifact_file_name(database_id, &timestamp_now());
        let container_path = format!("/tmp/{}", file_name);
        let output_path = self.backup_dir.join(&file_name);

        tracing::info!(database = %database_id, container = %self.container, "creating backup (using Docker)");
        let dump = Command::new(&docker)
            .args(self.exec_dump_args(database_id, &container_path))
            .env("PGPASSWORD", &self.connection.password)
            .output()
            .await?;

        if !dump.status.success() {
            self.remove_container_file(&docker, &container_path).await;
            return Err(command_error("docker exec pg_dump", &dump));
        }

        let copy = Command::new(&docker)
            .args(self.copy_out_args(&container_path, &output_path))
            .output()
            .await;
        self.remove_container_file(&docker, &container_path).await;

        let copy = copy?;
        if !copy.status.success() {
            discard_partial(&output_path).await;
            return Err(command_error("docker cp", &copy));
        }

        confirm_artifact(&output_path).await
    }
}

/// The backend selected by configuration.
#[derive(Debug, Clone)]
pub enum DumpBackend {
    Direct(PgDumpBackend),
    Docker(DockerBackend),
}

impl DumpBackend {
    pub fn from_config(config: &BackupConfig) -> Self {
        match &config.strategy {
            DumpStrategy::Direct => {
                DumpBackend::Direct(PgDumpBackend::new(&config.backup_dir, config.connection.clone()))
            }
            DumpStrategy::Docker { container } => DumpBackend::Docker(DockerBackend::new(
                &config.backup_dir,
                config.connection.clone(),
                container.clone(),
            )),
        }
    }
}

impl ArtifactBackend for DumpBackend {
    async fn create(&self, database_id: &str) -> Result<PathBuf> {
        match self {
            DumpBackend::Direct(backend) => backend.create(database_id).await,
            DumpBackend::Docker(backend) => backend.create(database_id).await,
        }
    }
}
