pub mod databases;
pub mod logging;
pub mod setting;

use std::path::PathBuf;
use which::which;

use crate::errors::{BackupError, Result};

/// Finds an external tool (`pg_dump`, `docker`) in the system PATH.
pub fn find_executable(tool: &str) -> Result<PathBuf> {
    which(tool).map_err(|source| BackupError::ToolNotFound {
        tool: tool.to_string(),
        source,
    })
}
