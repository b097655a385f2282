//! JSON summary of a finished build, kept next to the build logs.

use crate::builder::error::{BuildError, Result};
use crate::builder::layout::DistributionVersions;
use crate::builder::repos::RepoPin;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const RECORD_FILE: &str = "build-record.json";

/// Where the versions and pins came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecordMode {
    Seed { path: PathBuf },
    Version,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildRecord {
    pub rid: String,
    pub mode: RecordMode,
    pub configuration: String,
    pub versions: DistributionVersions,
    pub pins: Vec<RepoPin>,
    pub output: PathBuf,
    pub completed: DateTime<Utc>,
}

impl BuildRecord {
    /// Write the record to `<workdir>/logs/build-record.json`.
    pub fn write(&self, workdir: &Path) -> Result<PathBuf> {
        let dir = workdir.join("logs");
        std::fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;

        let path = dir.join(RECORD_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| BuildError::io(&path, e.into()))?;
        std::fs::write(&path, json + "\n").map_err(|e| BuildError::io(&path, e))?;

        tracing::info!("Build record: {}", path.display());
        Ok(path)
    }
}
