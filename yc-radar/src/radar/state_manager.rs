/*!
Persistent snapshot of every company id seen so far
*/

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::radar::error::StateError;

pub const STATE_VERSION: u32 = 1;

/// What the previous run knew about the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownState {
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    /// Watermark for window queries, seconds since the epoch
    #[serde(default)]
    pub last_run_timestamp: i64,
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub known_ids: BTreeSet<String>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    STATE_VERSION
}

impl KnownState {
    pub fn new(known_ids: BTreeSet<String>, total_count: u64, now: DateTime<Utc>) -> Self {
        Self {
            last_run_at: Some(now),
            last_run_timestamp: now.timestamp(),
            total_count,
            known_ids,
            version: STATE_VERSION,
        }
    }
}

/// Reads and atomically replaces the state file. Assumes a single writer.
pub struct StateManager {
    path: PathBuf,
}

impl StateManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` on the very first run. A file that does not parse is an error.
    pub fn load(&self) -> Result<Option<KnownState>, StateError> {
        let Some(content) = read_if_exists(&self.path)? else {
            info!("No state file found at {} - first run", self.path.display());
            return Ok(None);
        };

        let state: KnownState = serde_json::from_str(&content).map_err(|source| StateError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        if state.version > STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                path: self.path.clone(),
                found: state.version,
                supported: STATE_VERSION,
            });
        }

        info!(
            "Loaded state: {} known IDs, last run {}",
            state.known_ids.len(),
            state
                .last_run_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        );
        Ok(Some(state))
    }

    /// Replace the whole record, stamping it with the current time
    pub fn save(&self, known_ids: BTreeSet<String>, total_count: u64) -> Result<KnownState, StateError> {
        let state = KnownState::new(known_ids, total_count, Utc::now());
        write_json_atomic(&self.path, &state)?;
        info!("State saved: {} IDs, count={}", state.known_ids.len(), state.total_count);
        Ok(state)
    }
}

pub(crate) fn read_if_exists(path: &Path) -> Result<Option<String>, StateError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StateError::io(path, e)),
    }
}

/// Write to a temp file in the same directory, then rename over `path`
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| StateError::io(&dir, e))?;

    let json = serde_json::to_vec_pretty(value)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| StateError::io(&dir, e))?;
    tmp.write_all(&json).map_err(|e| StateError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| StateError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| StateError::io(path, e.error))?;
    Ok(())
}
